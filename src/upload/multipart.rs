use uuid::Uuid;

/// Hand-built `multipart/form-data` body.
///
/// The file host expects its fields in a fixed layout, so parts are written in the
/// order they are added.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::with_boundary(format!("----WebKitFormBoundary{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary,
                name,
                filename.replace('"', "_"),
                content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Close the body; returns the `Content-Type` header value and the bytes
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let (content_type, body) = MultipartForm::with_boundary("XYZ")
            .text("sid", "abc")
            .file("file_1_", "song.mp3", "audio/mpeg", b"ID3")
            .finish();

        assert_eq!(content_type, "multipart/form-data; boundary=XYZ");
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "--XYZ\r\nContent-Disposition: form-data; name=\"sid\"\r\n\r\nabc\r\n\
             --XYZ\r\nContent-Disposition: form-data; name=\"file_1_\"; filename=\"song.mp3\"\r\n\
             Content-Type: audio/mpeg\r\n\r\nID3\r\n\
             --XYZ--\r\n"
        );
    }

    #[test]
    fn test_random_boundary() {
        let a = MultipartForm::new();
        let b = MultipartForm::new();
        assert!(a.boundary().starts_with("----WebKitFormBoundary"));
        assert_ne!(a.boundary(), b.boundary());
    }
}
