use reqwest::{multipart, Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::{ApiError, ApiResult, ClientEvents, LogEvents};
use crate::session::SessionContext;
use plaza_types::*;

/// Default API root when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// API client for communicating with the Plaza server
///
/// Attaches the session's bearer token, unwraps the JSON envelope into the
/// endpoint's typed payload and funnels every failure through one place, so
/// a rejected token clears the session no matter which call saw it.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionContext,
    events: Arc<dyn ClientEvents>,
}

impl ApiClient {
    /// Create a new API client bound to a session
    pub fn new(base_url: impl Into<String>, session: SessionContext) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            session,
            events: Arc::new(LogEvents),
        }
    }

    /// Replace the failure hooks
    pub fn with_events(mut self, events: Arc<dyn ClientEvents>) -> Self {
        self.events = events;
        self
    }

    /// Use a preconfigured reqwest client (timeouts, proxies)
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Build a request with the bearer token attached when one is present
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self.client.request(method, url);
        match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request and return the raw body of a successful response.
    async fn execute(&self, req: RequestBuilder) -> ApiResult<(String, Vec<u8>)> {
        let request = req.build().map_err(|e| self.report(ApiError::Network(e)))?;
        let endpoint = format!("{} {}", request.method(), request.url().path());
        crate::log_api_call!("-> {}", endpoint);

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.report(ApiError::Network(e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.report(ApiError::Network(e)))?
            .to_vec();
        crate::log_api_call!("<- {} {} ({} bytes)", endpoint, status.as_u16(), body.len());

        if !status.is_success() {
            let message = failure_message(status.as_u16(), &body);
            return Err(self.report(ApiError::from_status(status.as_u16(), message)));
        }

        Ok((endpoint, body))
    }

    /// Send a request whose response is `Envelope<T>` and return the payload
    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        let (endpoint, body) = self.execute(req).await?;
        let envelope: Envelope<T> = self.decode(&endpoint, &body)?;

        if !envelope.success {
            let message = envelope
                .failure_message()
                .unwrap_or("Request failed")
                .to_string();
            return Err(self.report(ApiError::Api {
                status: 200,
                message,
            }));
        }

        envelope.data.ok_or_else(|| {
            self.report(ApiError::Schema {
                endpoint,
                reason: "response envelope has no data".to_string(),
            })
        })
    }

    /// Send a request whose successful response carries no payload
    async fn fetch_empty(&self, req: RequestBuilder) -> ApiResult<()> {
        let (endpoint, body) = self.execute(req).await?;
        if body.is_empty() {
            return Ok(());
        }
        let envelope: Envelope<serde_json::Value> = self.decode(&endpoint, &body)?;
        if envelope.success {
            Ok(())
        } else {
            let message = envelope
                .failure_message()
                .unwrap_or("Request failed")
                .to_string();
            Err(self.report(ApiError::Api {
                status: 200,
                message,
            }))
        }
    }

    /// Send a request whose response is a `Page<T>`
    async fn fetch_page<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<Page<T>> {
        let (endpoint, body) = self.execute(req).await?;
        self.decode(&endpoint, &body)
    }

    fn decode<T: DeserializeOwned>(&self, endpoint: &str, body: &[u8]) -> ApiResult<T> {
        serde_json::from_slice(body).map_err(|e| {
            self.report(ApiError::Schema {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Single exit for every failure: log it, drop the session on 401 and
    /// notify the front end.
    fn report(&self, err: ApiError) -> ApiError {
        log::warn!("API request failed: {}", err);

        if err.is_unauthorized() {
            if let Err(e) = self.session.clear() {
                log::warn!("Failed to clear session after 401: {:#}", e);
            }
            self.events.on_unauthorized();
        }

        self.events.on_error(&err.user_message());
        err
    }

    // Authentication endpoints

    /// Register a new account
    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse> {
        self.fetch(self.request(Method::POST, "/auth/register").json(request))
            .await
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse> {
        self.fetch(self.request(Method::POST, "/auth/login").json(request))
            .await
    }

    /// The user the current token belongs to
    pub async fn current_user(&self) -> ApiResult<User> {
        self.fetch(self.request(Method::GET, "/auth/me")).await
    }

    // Post endpoints

    /// Create a new post
    pub async fn create_post(&self, request: &CreatePostRequest) -> ApiResult<Post> {
        self.fetch(self.request(Method::POST, "/posts").json(request))
            .await
    }

    /// Get one page of the feed, newest first
    pub async fn list_posts(&self, page: u32, limit: u32) -> ApiResult<Page<Post>> {
        let req = self
            .request(Method::GET, "/posts")
            .query(&[("page", page), ("limit", limit)]);
        self.fetch_page(req).await
    }

    /// Get a single post by ID
    pub async fn get_post(&self, post_id: PostId) -> ApiResult<Post> {
        self.fetch(self.request(Method::GET, &format!("/posts/{}", post_id)))
            .await
    }

    /// Update a post
    pub async fn update_post(&self, post_id: PostId, request: &UpdatePostRequest) -> ApiResult<Post> {
        let req = self
            .request(Method::PUT, &format!("/posts/{}", post_id))
            .json(request);
        self.fetch(req).await
    }

    /// Delete a post
    pub async fn delete_post(&self, post_id: PostId) -> ApiResult<()> {
        self.fetch_empty(self.request(Method::DELETE, &format!("/posts/{}", post_id)))
            .await
    }

    /// Toggle the viewer's like on a post
    pub async fn toggle_post_like(&self, post_id: PostId) -> ApiResult<LikeStatus> {
        self.fetch(self.request(Method::POST, &format!("/posts/{}/like", post_id)))
            .await
    }

    /// Users who liked a post
    pub async fn post_likes(&self, post_id: PostId) -> ApiResult<Vec<User>> {
        self.fetch(self.request(Method::GET, &format!("/posts/{}/likes", post_id)))
            .await
    }

    // Comment endpoints

    /// Create a top-level comment, or a reply when `parent` is given
    pub async fn create_comment(
        &self,
        post_id: PostId,
        content: String,
        parent: Option<CommentId>,
    ) -> ApiResult<Comment> {
        let request = CreateCommentRequest {
            content,
            parent_comment_id: parent,
        };
        let req = self
            .request(Method::POST, &format!("/posts/{}/comments", post_id))
            .json(&request);
        self.fetch(req).await
    }

    /// Top-level comments of a post, in server order
    pub async fn list_comments(&self, post_id: PostId) -> ApiResult<Vec<Comment>> {
        self.fetch(self.request(Method::GET, &format!("/posts/{}/comments", post_id)))
            .await
    }

    /// Reply through the older per-comment route.
    ///
    /// Prefer [`ApiClient::create_comment`] with a parent id.
    pub async fn create_reply(&self, comment_id: CommentId, content: String) -> ApiResult<Comment> {
        let request = CreateCommentRequest {
            content,
            parent_comment_id: None,
        };
        let req = self
            .request(Method::POST, &format!("/comments/{}/replies", comment_id))
            .json(&request);
        self.fetch(req).await
    }

    /// Replies to a comment, in server order
    pub async fn list_replies(&self, comment_id: CommentId) -> ApiResult<Vec<Comment>> {
        self.fetch(self.request(Method::GET, &format!("/comments/{}/replies", comment_id)))
            .await
    }

    /// Delete a comment or reply
    pub async fn delete_comment(&self, comment_id: CommentId) -> ApiResult<()> {
        self.fetch_empty(self.request(Method::DELETE, &format!("/comments/{}", comment_id)))
            .await
    }

    /// Toggle the viewer's like on a comment
    pub async fn toggle_comment_like(&self, comment_id: CommentId) -> ApiResult<LikeStatus> {
        self.fetch(self.request(Method::POST, &format!("/comments/{}/like", comment_id)))
            .await
    }

    /// Users who liked a comment
    pub async fn comment_likes(&self, comment_id: CommentId) -> ApiResult<Vec<User>> {
        self.fetch(self.request(Method::GET, &format!("/comments/{}/likes", comment_id)))
            .await
    }

    // Upload endpoints

    /// Upload an image; the returned `url` can be used as a post's `image_url`
    pub async fn upload_image(&self, file_name: String, bytes: Vec<u8>) -> ApiResult<UploadResponse> {
        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new().part("image", part);
        self.fetch(self.request(Method::POST, "/upload").multipart(form))
            .await
    }

    /// Absolute URL for an uploaded image path.
    ///
    /// Uploads are served next to the API, not under it, so a trailing
    /// `/api` is dropped from the base URL.
    pub fn image_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let root = self.base_url.strip_suffix("/api").unwrap_or(&self.base_url);
        format!("{}{}", root, path)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish()
    }
}

/// Pull a readable message out of a failed response body
fn failure_message(status: u16, body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        if let Some(message) = parsed.failure_message() {
            return message.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();

    // HTML error pages from proxies are not worth showing
    if text.contains("<html") || text.contains("<!DOCTYPE") {
        return format!("Server returned {} error. Please check the server URL.", status);
    }

    if text.is_empty() {
        "Something went wrong".to_string()
    } else {
        text.to_string()
    }
}
