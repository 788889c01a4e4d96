use crate::client::SynoError;
use crate::client::SynoError::{InvalidInput, InvalidResponse};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

/// Response envelope shared by every webapi call
#[derive(Deserialize, Debug)]
pub struct SynologyResponse<D> {
    pub success: bool,
    pub data: Option<D>,
    pub error: Option<ApiError>,
}

/// Error information from Synology API
#[derive(Deserialize, Debug)]
pub struct ApiError {
    pub code: i32,
}

/// Authentication response data
#[derive(Deserialize, Debug)]
pub struct AuthData {
    /// Session ID used for authenticated requests
    pub sid: Option<String>,
}

/// Outcome of a successful webapi call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// `data` member of a successful envelope
    Data(Value),
    /// Successful envelope without a `data` member
    Success,
    /// Text body that isn't JSON at all, some endpoints reply with bare tokens
    Text(String),
    /// Body returned as is because its content type isn't textual, e.g. a download
    Binary(Vec<u8>),
}

impl ApiResponse {
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        match self {
            ApiResponse::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Deserializes the `data` payload into a typed structure
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The response carries no `data` payload
    /// - The payload doesn't match `T`
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, SynoError> {
        match self {
            ApiResponse::Data(data) => serde_json::from_value(data)
                .map_err(|e| InvalidResponse(format!("Unexpected data payload: {e}"))),
            other => Err(InvalidResponse(format!("No data received, got {other:?}"))),
        }
    }
}

/// HTTP verb used to reach the webapi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Ordered request parameters. Inserting an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A bare value becomes a single positional parameter
impl From<&str> for Params {
    fn from(value: &str) -> Self {
        Params::new().with("0", value)
    }
}

impl From<String> for Params {
    fn from(value: String) -> Self {
        Params::new().with("0", value)
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl<K: Into<String>, V: ToString, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: ToString> From<Vec<(K, V)>> for Params {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

/// File sent with an upload request
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub filename: String,
    pub content: Vec<u8>,
}

impl FilePayload {
    #[must_use]
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }

    /// Reads a local file, keeping its file name for the upload
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path has no file name component
    /// - The file can't be read
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SynoError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| InvalidInput(format!("Not a file path: {}", path.display())))?
            .to_string();
        let content = tokio::fs::read(path).await?;
        Ok(Self::new(filename, content))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Everything needed to issue one webapi call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) service: String,
    pub(crate) api: String,
    pub(crate) path: String,
    pub(crate) method: String,
    pub(crate) params: Params,
    pub(crate) version: Option<u32>,
    pub(crate) http_method: HttpMethod,
    pub(crate) file: Option<FilePayload>,
    pub(crate) requires_session: bool,
}

impl ApiRequest {
    /// Describes a call to `{namespace}.{service}.{api}` at `/webapi/{path}`
    pub fn new(
        service: impl Into<String>,
        api: impl Into<String>,
        path: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            api: api.into(),
            path: path.into(),
            method: method.into(),
            params: Params::new(),
            version: None,
            http_method: HttpMethod::Get,
            file: None,
            requires_session: true,
        }
    }

    #[must_use]
    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Overrides the client's API version, zero keeps the default
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn http_method(mut self, http_method: HttpMethod) -> Self {
        self.http_method = http_method;
        self
    }

    /// Attaches a file, turning the call into a multipart POST upload
    #[must_use]
    pub fn file(mut self, file: FilePayload) -> Self {
        self.file = Some(file);
        self.http_method = HttpMethod::Post;
        self
    }

    /// Allows the call without an active session (login, API discovery)
    #[must_use]
    pub fn without_session(mut self) -> Self {
        self.requires_session = false;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), SynoError> {
        if self.service.is_empty() {
            return Err(InvalidInput("Service name cannot be empty".into()));
        }
        if self.api.is_empty() {
            return Err(InvalidInput("API name cannot be empty".into()));
        }
        if self.method.is_empty() {
            return Err(InvalidInput("Method name cannot be empty".into()));
        }
        if let Some(file) = &self.file {
            if self.http_method != HttpMethod::Post {
                return Err(InvalidInput("A file can only be sent with POST".into()));
            }
            if file.filename.is_empty() {
                return Err(InvalidInput("File name cannot be empty".into()));
            }
            if !is_header_safe(&file.filename) {
                return Err(InvalidInput(format!(
                    "File name cannot contain quotes or line breaks: {:?}",
                    file.filename
                )));
            }
            if let Some((name, _)) = self.params.iter().find(|(name, _)| !is_header_safe(name)) {
                return Err(InvalidInput(format!(
                    "Form field name cannot contain quotes or line breaks: {name:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Whether a value can be quoted inside a multipart `Content-Disposition` header
fn is_header_safe(value: &str) -> bool {
    !value.contains(['"', '\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_insert_replaces() {
        let mut params = Params::from([("limit", 25), ("offset", 0)]);
        params.insert("limit", 100);

        assert_eq!(2, params.len());
        assert_eq!(Some("100"), params.get("limit"));
        assert_eq!(
            vec![("limit", "100"), ("offset", "0")],
            params.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_params_from_scalar() {
        let params = Params::from("all");
        assert_eq!(Some("all"), params.get("0"));
        assert_eq!(1, params.len());
    }

    #[test]
    fn test_params_remove() {
        let mut params = Params::new().with("a", "1").with("b", "2");
        assert_eq!(Some("1".to_string()), params.remove("a"));
        assert_eq!(None, params.remove("a"));
        assert_eq!(vec![("b", "2")], params.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_into_data() {
        #[derive(Deserialize, Debug)]
        struct Info {
            version: u32,
        }

        let response = ApiResponse::Data(json!({"version": 3}));
        let info: Info = response.into_data().unwrap();
        assert_eq!(3, info.version);

        let error = ApiResponse::Success.into_data::<Info>().unwrap_err();
        assert!(matches!(error, InvalidResponse(_)));
    }

    #[test]
    fn test_file_sets_post() {
        let request = ApiRequest::new("FileStation", "Upload", "entry.cgi", "upload")
            .file(FilePayload::new("f.txt", b"hello".to_vec()));
        assert_eq!(HttpMethod::Post, request.http_method);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let request = ApiRequest::new("FileStation", "", "entry.cgi", "list");
        assert!(matches!(request.validate(), Err(InvalidInput(_))));

        let request = ApiRequest::new("FileStation", "List", "entry.cgi", "");
        assert!(matches!(request.validate(), Err(InvalidInput(_))));

        let request = ApiRequest::new("FileStation", "Upload", "entry.cgi", "upload")
            .file(FilePayload::new("", Vec::new()));
        assert!(matches!(request.validate(), Err(InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_unsafe_multipart_names() {
        for filename in ["a\"b.txt", "a\r\nContent-Type: text/html", "line\nbreak.txt"] {
            let request = ApiRequest::new("FileStation", "Upload", "entry.cgi", "upload")
                .file(FilePayload::new(filename, b"x".to_vec()));
            assert!(matches!(request.validate(), Err(InvalidInput(_))), "{filename:?}");
        }

        let request = ApiRequest::new("FileStation", "Upload", "entry.cgi", "upload")
            .param("path\"; filename=\"evil", "/upload")
            .file(FilePayload::new("f.txt", b"x".to_vec()));
        assert!(matches!(request.validate(), Err(InvalidInput(_))));

        let request = ApiRequest::new("FileStation", "List", "entry.cgi", "list")
            .param("pattern", "\"quoted\"");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_file_on_get() {
        let request = ApiRequest::new("FileStation", "Upload", "entry.cgi", "upload")
            .file(FilePayload::new("f.txt", b"x".to_vec()))
            .http_method(HttpMethod::Get);
        assert!(matches!(request.validate(), Err(InvalidInput(_))));
    }
}
