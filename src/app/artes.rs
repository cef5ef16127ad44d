//! Artwork resource
//!
//! In-memory repository and its CRUD controller. Records are stored and
//! echoed back; pricing and presentation rules live elsewhere.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use crate::container::{Container, Injectable};
use crate::dispatch::{escape_html, HandlerResult, ResourceController};
use crate::error::{ContainerError, DispatchError, FieldErrors};
use crate::http::{Params, Request, Response};
use crate::routing::RouteParams;

/// One artwork
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arte {
    pub id: i64,
    pub titulo: String,
    pub artista: String,
    pub ano: Option<i64>,
}

/// Submitted artwork fields, validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovaArte {
    pub titulo: String,
    pub artista: String,
    pub ano: Option<i64>,
}

impl NovaArte {
    /// Read and check the form fields of `request`
    pub fn from_request(request: &Request) -> Result<Self, DispatchError> {
        let mut errors = FieldErrors::new();

        let titulo = request.get_or("titulo", "").trim().to_string();
        if titulo.is_empty() {
            errors.insert("titulo".to_string(), "O título é obrigatório.".to_string());
        }
        let artista = request.get_or("artista", "").trim().to_string();

        let ano = match request.get("ano").map(str::trim).filter(|v| !v.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(ano) => Some(ano),
                Err(_) => {
                    errors.insert("ano".to_string(), "O ano deve ser numérico.".to_string());
                    None
                }
            },
        };

        if errors.is_empty() {
            Ok(Self {
                titulo,
                artista,
                ano,
            })
        } else {
            Err(DispatchError::Validation(errors))
        }
    }
}

/// Artwork storage
pub trait ArteRepository: Send + Sync {
    fn all(&self) -> Vec<Arte>;
    fn find(&self, id: i64) -> Option<Arte>;
    fn create(&self, arte: NovaArte) -> Arte;
    fn update(&self, id: i64, arte: NovaArte) -> Option<Arte>;
    fn delete(&self, id: i64) -> bool;
}

/// Process-local repository
#[derive(Debug, Default)]
pub struct MemoryArteRepository {
    state: Mutex<(i64, BTreeMap<i64, Arte>)>,
}

impl MemoryArteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArteRepository for MemoryArteRepository {
    fn all(&self) -> Vec<Arte> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.1.values().cloned().collect()
    }

    fn find(&self, id: i64) -> Option<Arte> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.1.get(&id).cloned()
    }

    fn create(&self, arte: NovaArte) -> Arte {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.0 += 1;
        let stored = Arte {
            id: state.0,
            titulo: arte.titulo,
            artista: arte.artista,
            ano: arte.ano,
        };
        state.1.insert(stored.id, stored.clone());
        stored
    }

    fn update(&self, id: i64, arte: NovaArte) -> Option<Arte> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = state.1.get_mut(&id)?;
        stored.titulo = arte.titulo;
        stored.artista = arte.artista;
        stored.ano = arte.ano;
        Some(stored.clone())
    }

    fn delete(&self, id: i64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.1.remove(&id).is_some()
    }
}

/// CRUD controller for `/artes`
pub struct ArteController {
    repository: Arc<dyn ArteRepository>,
}

impl Injectable for ArteController {
    fn inject(container: &Container) -> Result<Self, ContainerError> {
        Ok(Self {
            repository: container.resolve()?,
        })
    }
}

impl ArteController {
    fn find(&self, params: &RouteParams) -> Result<Arte, DispatchError> {
        let id = params.int("id")?;
        self.repository
            .find(id)
            .ok_or_else(|| DispatchError::not_found(format!("Arte #{id}")))
    }
}

impl ResourceController for ArteController {
    fn index(&self, request: &Request, _: &RouteParams) -> HandlerResult {
        let artes = self.repository.all();
        if request.wants_json() {
            return Ok(Response::json(&artes, 200).into());
        }

        let mut page = flash_notice(request);
        page.push_str("<ul>\n");
        for arte in &artes {
            let _ = writeln!(
                page,
                "<li><a href=\"{}\">{}</a></li>",
                escape_html(&request.url(&format!("/artes/{}", arte.id))),
                escape_html(&arte.titulo)
            );
        }
        page.push_str("</ul>\n");
        Ok(page.into())
    }

    fn create(&self, request: &Request, _: &RouteParams) -> HandlerResult {
        Ok(form(request, &request.url("/artes"), None, None).into())
    }

    fn store(&self, request: &Request, _: &RouteParams) -> HandlerResult {
        let arte = self.repository.create(NovaArte::from_request(request)?);
        if request.wants_json() {
            return Ok(Response::json(&arte, 201).into());
        }
        Ok(Response::redirect(&request.url(&format!("/artes/{}", arte.id)), 302)
            .with("sucesso", "Arte cadastrada.")
            .into())
    }

    fn show(&self, request: &Request, params: &RouteParams) -> HandlerResult {
        let arte = self.find(params)?;
        if request.wants_json() {
            return Ok(Response::json(&arte, 200).into());
        }
        Ok(format!(
            "{}<h1>{}</h1>\n<p>{}</p>\n",
            flash_notice(request),
            escape_html(&arte.titulo),
            escape_html(&arte.artista)
        )
        .into())
    }

    fn edit(&self, request: &Request, params: &RouteParams) -> HandlerResult {
        let arte = self.find(params)?;
        let action = request.url(&format!("/artes/{}/atualizar", arte.id));
        Ok(form(request, &action, Some("PUT"), Some(&arte)).into())
    }

    fn update(&self, request: &Request, params: &RouteParams) -> HandlerResult {
        let id = params.int("id")?;
        let fields = NovaArte::from_request(request)?;
        let arte = self
            .repository
            .update(id, fields)
            .ok_or_else(|| DispatchError::not_found(format!("Arte #{id}")))?;
        if request.wants_json() {
            return Ok(Response::json(&arte, 200).into());
        }
        Ok(Response::redirect(&request.url(&format!("/artes/{id}")), 302)
            .with("sucesso", "Arte atualizada.")
            .into())
    }

    fn destroy(&self, request: &Request, params: &RouteParams) -> HandlerResult {
        let id = params.int("id")?;
        if !self.repository.delete(id) {
            return Err(DispatchError::not_found(format!("Arte #{id}")));
        }
        if request.wants_json() {
            return Ok(Response::new().set_status_code(204).into());
        }
        Ok(Response::redirect(&request.url("/artes"), 302)
            .with("sucesso", "Arte removida.")
            .into())
    }
}

fn flash_notice(request: &Request) -> String {
    request
        .session()
        .flash("sucesso")
        .and_then(|v| v.as_str())
        .map(|msg| format!("<p class=\"sucesso\">{}</p>\n", escape_html(msg)))
        .unwrap_or_default()
}

/// Create/edit form, repopulated from flashed input and errors
fn form(request: &Request, action: &str, method: Option<&str>, arte: Option<&Arte>) -> String {
    let session = request.session();
    let errors = session.errors();
    let mut current = Params::new();
    if let Some(arte) = arte {
        current.insert("titulo".to_string(), arte.titulo.clone());
        current.insert("artista".to_string(), arte.artista.clone());
        if let Some(ano) = arte.ano {
            current.insert("ano".to_string(), ano.to_string());
        }
    }

    let mut page = format!("<form method=\"post\" action=\"{}\">\n", escape_html(action));
    if let Some(method) = method {
        let _ = writeln!(page, "<input type=\"hidden\" name=\"_method\" value=\"{method}\">");
    }
    for field in ["titulo", "artista", "ano"] {
        let value = session
            .old(field)
            .or_else(|| current.get(field).map(String::as_str))
            .unwrap_or("");
        let _ = writeln!(
            page,
            "<input name=\"{field}\" value=\"{}\">",
            escape_html(value)
        );
        if let Some(message) = errors.get(field) {
            let _ = writeln!(page, "<span class=\"erro\">{}</span>", escape_html(message));
        }
    }
    page.push_str("<button>Salvar</button>\n</form>\n");
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;

    fn nova(titulo: &str) -> NovaArte {
        NovaArte {
            titulo: titulo.to_string(),
            artista: "Tarsila do Amaral".to_string(),
            ano: Some(1928),
        }
    }

    #[test]
    fn test_repository_crud() {
        let repo = MemoryArteRepository::new();
        let a = repo.create(nova("Abaporu"));
        let b = repo.create(nova("Operários"));
        assert_eq!((a.id, b.id), (1, 2));

        assert_eq!(repo.update(1, nova("A Negra")).map(|a| a.titulo), Some("A Negra".to_string()));
        assert!(repo.update(9, nova("x")).is_none());
        assert!(repo.delete(2));
        assert!(!repo.delete(2));
        assert_eq!(repo.all().len(), 1);
        assert_eq!(repo.find(1).map(|a| a.ano), Some(Some(1928)));
    }

    #[test]
    fn test_validation() {
        let req = Request::builder()
            .method(Method::POST)
            .form(&[("titulo", " "), ("ano", "mil")])
            .build();
        match NovaArte::from_request(&req) {
            Err(DispatchError::Validation(errors)) => {
                assert!(errors.contains_key("titulo"));
                assert!(errors.contains_key("ano"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }

        let req = Request::builder()
            .method(Method::POST)
            .form(&[("titulo", "Abaporu"), ("ano", "")])
            .build();
        let arte = NovaArte::from_request(&req).unwrap();
        assert_eq!(arte.ano, None);
    }

    #[test]
    fn test_form_escapes_and_repopulates() {
        let mut arte = nova("<Abaporu>").into_arte(3);
        arte.artista = "Tarsila".to_string();
        let html = form(&Request::builder().build(), "/artes/3/atualizar", Some("PUT"), Some(&arte));
        assert!(html.contains("value=\"&lt;Abaporu&gt;\""));
        assert!(html.contains("name=\"_method\" value=\"PUT\""));
    }

    impl NovaArte {
        fn into_arte(self, id: i64) -> Arte {
            Arte {
                id,
                titulo: self.titulo,
                artista: self.artista,
                ano: self.ano,
            }
        }
    }
}
