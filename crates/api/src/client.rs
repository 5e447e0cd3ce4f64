use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use {
    futures::StreamExt,
    reqwest::{
        Method, Request, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT},
        multipart::{Form, Part},
    },
    serde_json::Value,
    tracing::debug,
    xurl_common::{AuthError, Error, Result},
    xurl_config::XurlConfig,
    xurl_oauth::{AuthKind, Authenticator},
};

pub const CLIENT_USER_AGENT: &str = concat!("xurl/", env!("CARGO_PKG_VERSION"));
pub const TRACE_HEADER: &str = "x-b3-flags";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest line a stream may deliver.
pub const MAX_STREAM_LINE: usize = 1024 * 1024;

const BODY_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

/// One logical API call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP method; empty means `GET`.
    pub method: String,
    /// Path relative to the API base URL, or an absolute URL.
    pub endpoint: String,
    /// Extra headers as `Name: value`.
    pub headers: Vec<String>,
    /// Raw body. Only sent for `POST`, `PUT` and `PATCH`.
    pub data: String,
    pub auth: AuthKind,
    /// OAuth2 account to act as.
    pub username: Option<String>,
    pub verbose: bool,
    pub trace: bool,
}

impl RequestOptions {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    fn http_method(&self) -> Result<Method> {
        let name = match self.method.trim() {
            "" => "GET".to_string(),
            m => m.to_uppercase(),
        };
        Method::from_bytes(name.as_bytes())
            .map_err(|e| Error::http(format!("invalid method {name}: {e}")))
    }
}

/// Where the file part of a multipart request comes from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Bytes { file_name: String, data: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct MultipartOptions {
    pub request: RequestOptions,
    pub form_fields: BTreeMap<String, String>,
    pub file_field: String,
    pub file: FileSource,
}

/// Sends requests to the X API with the resolved credentials attached.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    stream_http: reqwest::Client,
    auth: Option<Authenticator>,
}

impl ApiClient {
    pub fn new(config: &XurlConfig, auth: Option<Authenticator>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        // Streams stay open until the remote closes them.
        let stream_http = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: config.api_base_url.clone(),
            http,
            stream_http,
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn authenticator(&self) -> Option<&Authenticator> {
        self.auth.as_ref()
    }

    pub fn authenticator_mut(&mut self) -> Option<&mut Authenticator> {
        self.auth.as_mut()
    }

    /// Absolute URLs pass through; anything else is joined to the base URL.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.to_ascii_lowercase().starts_with("http") {
            return endpoint.to_string();
        }
        let path = endpoint.strip_prefix('/').unwrap_or(endpoint);
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    // ── Request construction ────────────────────────────────────────────────

    pub async fn build_request(&mut self, opts: &RequestOptions) -> Result<Request> {
        let method = opts.http_method()?;
        let url = self.resolve_url(&opts.endpoint);

        let body = (BODY_METHODS.contains(&method.as_str()) && !opts.data.is_empty())
            .then(|| opts.data.clone());
        let content_type = body.as_deref().map(body_content_type);
        let headers = self.headers_for(opts, &method, &url, content_type).await?;

        let mut builder = self.http.request(method, url.as_str()).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let request = builder.build()?;
        debug!(method = %request.method(), url = %request.url(), "built request");
        Ok(request)
    }

    pub async fn build_multipart_request(&mut self, opts: MultipartOptions) -> Result<Request> {
        let MultipartOptions {
            request,
            form_fields,
            file_field,
            file,
        } = opts;
        let method = request.http_method()?;
        let url = self.resolve_url(&request.endpoint);

        let part = match file {
            FileSource::Path(path) => {
                let data = tokio::fs::read(&path).await?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Part::bytes(data).file_name(name)
            },
            FileSource::Bytes { file_name, data } => Part::bytes(data).file_name(file_name),
        };
        let mut form = Form::new().part(file_field, part);
        for (key, value) in form_fields {
            form = form.text(key, value);
        }

        let mut headers = self.headers_for(&request, &method, &url, None).await?;
        // The multipart encoder sets its own boundary.
        headers.remove(CONTENT_TYPE);

        let request = self
            .http
            .request(method, url.as_str())
            .headers(headers)
            .multipart(form)
            .build()?;
        debug!(url = %request.url(), "built multipart request");
        Ok(request)
    }

    async fn headers_for(
        &mut self,
        opts: &RequestOptions,
        method: &Method,
        url: &str,
        content_type: Option<&'static str>,
    ) -> Result<HeaderMap> {
        let mut headers = parse_headers(&opts.headers);
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if !headers.contains_key(AUTHORIZATION) {
            let value = self.authorization(opts, method, url).await?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| Error::http(format!("invalid authorization header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if opts.trace {
            headers.insert(
                HeaderName::from_static(TRACE_HEADER),
                HeaderValue::from_static("1"),
            );
        }
        Ok(headers)
    }

    async fn authorization(
        &mut self,
        opts: &RequestOptions,
        method: &Method,
        url: &str,
    ) -> Result<String> {
        let auth = self.auth.as_mut().ok_or(AuthError::AuthNotSet)?;
        auth.authorization_header(opts.auth, method.as_str(), url, opts.username.as_deref())
            .await
    }

    // ── Execution ───────────────────────────────────────────────────────────

    /// Send a request and return its JSON body.
    pub async fn send_request(&mut self, opts: &RequestOptions) -> Result<Value> {
        let request = self.build_request(opts).await?;
        self.dispatch(request, opts.verbose).await
    }

    pub async fn send_multipart_request(&mut self, opts: MultipartOptions) -> Result<Value> {
        let verbose = opts.request.verbose;
        let request = self.build_multipart_request(opts).await?;
        self.dispatch(request, verbose).await
    }

    /// Send a request and hand every non-empty response line to `sink` as it
    /// arrives. Returns when the remote closes the connection.
    pub async fn stream_request(
        &mut self,
        opts: &RequestOptions,
        mut sink: impl FnMut(&str),
    ) -> Result<()> {
        let request = self.build_request(opts).await?;
        if opts.verbose {
            print_request(&request);
        }
        let response = self.stream_http.execute(request).await?;
        if opts.verbose {
            print_response(&response);
        }

        let status = response.status();
        if is_failure(status) {
            let body = response.bytes().await?;
            return parse_response(status, &body).map(|_| ());
        }

        debug!(url = %response.url(), "stream opened");
        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            pending.extend_from_slice(&chunk?);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                emit_line(&line, &mut sink)?;
            }
            if pending.len() > MAX_STREAM_LINE {
                return Err(line_too_long());
            }
        }
        emit_line(&pending, &mut sink)?;
        debug!("stream closed by remote");
        Ok(())
    }

    async fn dispatch(&self, request: Request, verbose: bool) -> Result<Value> {
        if verbose {
            print_request(&request);
        }
        let response = self.http.execute(request).await?;
        if verbose {
            print_response(&response);
        }
        let status = response.status();
        let body = response.bytes().await?;
        parse_response(status, &body)
    }
}

fn is_failure(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

fn body_content_type(data: &str) -> &'static str {
    if serde_json::from_str::<Value>(data).is_ok() {
        JSON_CONTENT_TYPE
    } else {
        FORM_CONTENT_TYPE
    }
}

/// Parse `Name: value` strings, skipping entries that are not valid headers.
fn parse_headers(raw: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(':') else {
            debug!("skipping header without ':'");
            continue;
        };
        match (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            },
            _ => debug!(name = name.trim(), "skipping invalid header"),
        }
    }
    headers
}

/// Turn a buffered response into the call's result.
///
/// Empty bodies read as `{}`. An error status carries its JSON body as
/// [`Error::Api`]; a non-JSON body on an error status is [`Error::Http`].
pub(crate) fn parse_response(status: StatusCode, body: &[u8]) -> Result<Value> {
    let failed = is_failure(status);
    let value = if body.is_empty() {
        serde_json::json!({})
    } else {
        match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) if failed => return Err(Error::http(status.to_string())),
            Err(_) => serde_json::json!({}),
        }
    };
    if failed {
        return Err(Error::Api(value));
    }
    Ok(value)
}

fn emit_line(raw: &[u8], sink: &mut impl FnMut(&str)) -> Result<()> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.len() > MAX_STREAM_LINE {
        return Err(line_too_long());
    }
    if !line.is_empty() {
        sink(&String::from_utf8_lossy(line));
    }
    Ok(())
}

fn line_too_long() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "stream line exceeds 1 MiB",
    ))
}

fn print_request(request: &Request) {
    eprintln!("> {} {}", request.method(), request.url());
    for (name, value) in request.headers() {
        eprintln!("> {name}: {}", value.to_str().unwrap_or("<binary>"));
    }
    eprintln!();
}

fn print_response(response: &Response) {
    eprintln!("< {}", response.status());
    for (name, value) in response.headers() {
        eprintln!("< {name}: {}", value.to_str().unwrap_or("<binary>"));
    }
    eprintln!();
}
