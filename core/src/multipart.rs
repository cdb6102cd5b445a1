//! `multipart/form-data` body construction.
//!
//! # Design
//! Fields are kept in insertion order and serialized in that order. File
//! fields never carry the caller's original file name: each gets a fresh
//! `<uuid>.<ext>` so path-like names never reach the server and repeated
//! uploads cannot collide.

use uuid::Uuid;

/// Media type of a binary attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Jpeg,
    Png,
    Mp4,
    QuickTime,
    Other { mime: String, extension: String },
}

impl MediaKind {
    pub fn mime(&self) -> &str {
        match self {
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Png => "image/png",
            MediaKind::Mp4 => "video/mp4",
            MediaKind::QuickTime => "video/quicktime",
            MediaKind::Other { mime, .. } => mime,
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            MediaKind::Jpeg => "jpg",
            MediaKind::Png => "png",
            MediaKind::Mp4 => "mp4",
            MediaKind::QuickTime => "mov",
            MediaKind::Other { extension, .. } => extension,
        }
    }
}

/// A binary attachment handed to an upload operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: MediaKind,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(kind: MediaKind, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn jpeg(data: impl Into<Vec<u8>>) -> Self {
        Self::new(MediaKind::Jpeg, data)
    }
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartField {
    File {
        field_name: String,
        filename: String,
        mime_type: String,
        data: Vec<u8>,
    },
    Text {
        field_name: String,
        value: String,
    },
}

impl MultipartField {
    /// A file part with a generated `<uuid>.<ext>` file name.
    pub fn file(field_name: impl Into<String>, attachment: Attachment) -> Self {
        MultipartField::File {
            field_name: field_name.into(),
            filename: unique_filename(attachment.kind.extension()),
            mime_type: attachment.kind.mime().to_string(),
            data: attachment.data,
        }
    }

    pub fn text(field_name: impl Into<String>, value: impl Into<String>) -> Self {
        MultipartField::Text {
            field_name: field_name.into(),
            value: value.into(),
        }
    }

    pub fn field_name(&self) -> &str {
        match self {
            MultipartField::File { field_name, .. } | MultipartField::Text { field_name, .. } => {
                field_name
            }
        }
    }
}

pub fn unique_filename(extension: &str) -> String {
    format!("{}.{extension}", Uuid::new_v4())
}

/// `images` + 1 -> `images[1]`.
pub fn indexed_field_name(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

/// An ordered multipart form bound to one boundary token.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    fields: Vec<MultipartField>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    /// A form with a random UUID boundary.
    pub fn new() -> Self {
        Self::with_boundary(Uuid::new_v4().to_string())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            fields: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn fields(&self) -> &[MultipartField] {
        &self.fields
    }

    pub fn push(&mut self, field: MultipartField) -> &mut Self {
        self.fields.push(field);
        self
    }

    /// Add every attachment under `base[0]`, `base[1]`, ...
    pub fn push_indexed_files(
        &mut self,
        base: &str,
        attachments: impl IntoIterator<Item = Attachment>,
    ) -> &mut Self {
        for (i, attachment) in attachments.into_iter().enumerate() {
            self.fields
                .push(MultipartField::file(indexed_field_name(base, i), attachment));
        }
        self
    }

    /// Value for the `Content-Type` request header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_multipart(&self.boundary, &self.fields)
    }
}

/// Serialize `fields` in order, closed by `--{boundary}--\r\n`.
pub fn encode_multipart(boundary: &str, fields: &[MultipartField]) -> Vec<u8> {
    let mut body = Vec::new();
    for field in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match field {
            MultipartField::File {
                field_name,
                filename,
                mime_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
                body.extend_from_slice(data);
            }
            MultipartField::Text { field_name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{field_name}\"\r\n\r\n")
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
