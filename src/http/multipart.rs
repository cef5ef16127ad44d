//! `multipart/form-data` decoding
//!
//! Buffered parser: the whole body is already in memory when a request is
//! constructed. Text parts become body parameters, parts carrying a
//! `filename` become uploaded files.

use hyper::body::Bytes;

/// A file received through a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name
    pub field: String,
    /// Client-side file name, with any directory part removed
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lower-cased extension of the client file name
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// One decoded part
#[derive(Debug)]
pub enum Part {
    Field { name: String, value: String },
    File(UploadedFile),
}

/// Extract the boundary parameter of a multipart `Content-Type`
pub fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Strip path components some browsers send (`C:\fakepath\foto.png`)
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}

/// Decode a multipart body. Malformed parts are skipped.
pub fn parse(body: &Bytes, boundary: &str) -> Vec<Part> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();

    let Some(mut cursor) = find(body, delimiter, 0) else {
        return parts;
    };

    loop {
        let after = cursor + delimiter.len();
        // Closing delimiter
        if body.get(after..after + 2) == Some(b"--".as_slice()) {
            break;
        }
        let header_start = match body.get(after..after + 2) {
            Some(b"\r\n") => after + 2,
            _ => after,
        };
        let Some(header_end) = find(body, b"\r\n\r\n", header_start) else {
            break;
        };
        let content_start = header_end + 4;
        let Some(next) = find(body, delimiter, content_start) else {
            break;
        };
        // Part content ends with CRLF before the next delimiter
        let content_end = if next >= 2 && &body[next - 2..next] == b"\r\n" {
            next - 2
        } else {
            next
        };

        let headers = String::from_utf8_lossy(&body[header_start..header_end]);
        if let Some(part) = decode_part(&headers, body.slice(content_start..content_end.max(content_start))) {
            parts.push(part);
        }
        cursor = next;
    }

    parts
}

fn decode_part(headers: &str, content: Bytes) -> Option<Part> {
    let mut name = None;
    let mut file_name = None;
    let mut content_type = None;

    for line in headers.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').skip(1) {
                let Some((k, v)) = param.trim().split_once('=') else {
                    continue;
                };
                let v = v.trim().trim_matches('"');
                match k.trim() {
                    "name" => name = Some(v.to_string()),
                    "filename" => file_name = Some(base_name(v)),
                    _ => {}
                }
            }
        } else if key.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let field = name?;
    match file_name {
        // An empty file input still sends a part, with an empty filename
        Some(file_name) if file_name.is_empty() => None,
        Some(file_name) => Some(Part::File(UploadedFile {
            field,
            file_name,
            content_type,
            data: content,
        })),
        None => Some(Part::Field {
            name: field,
            value: String::from_utf8_lossy(&content).into_owned(),
        }),
    }
}
