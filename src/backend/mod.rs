//! Client for the external commerce backend.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::config::Config;
use crate::{Result, StorefrontError};

pub mod payload;

/// Backend operations the session layer depends on.
///
/// The session layer is generic over this trait so tests can substitute an
/// in-memory backend; [`HttpBackend`] is the production implementation.
/// Reads return raw payloads because shape tolerance belongs to
/// [`payload`], not the transport.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_cart(&self, user_id: i64) -> Result<Value>;
    async fn fetch_product(&self, product_id: i64) -> Result<Value>;
    async fn fetch_discounts(&self) -> Result<Value>;
    async fn create_cart_item(&self, user_id: i64, product_id: i64, quantity: u32) -> Result<()>;
    async fn update_cart_item(&self, cart_item_id: i64, quantity: u32) -> Result<()>;
    async fn delete_cart_item(&self, cart_item_id: i64) -> Result<()>;
    async fn reset_cart(&self, user_id: i64) -> Result<()>;
}

#[async_trait]
impl<T: BackendApi + ?Sized> BackendApi for std::sync::Arc<T> {
    async fn fetch_cart(&self, user_id: i64) -> Result<Value> {
        (**self).fetch_cart(user_id).await
    }
    async fn fetch_product(&self, product_id: i64) -> Result<Value> {
        (**self).fetch_product(product_id).await
    }
    async fn fetch_discounts(&self) -> Result<Value> {
        (**self).fetch_discounts().await
    }
    async fn create_cart_item(&self, user_id: i64, product_id: i64, quantity: u32) -> Result<()> {
        (**self).create_cart_item(user_id, product_id, quantity).await
    }
    async fn update_cart_item(&self, cart_item_id: i64, quantity: u32) -> Result<()> {
        (**self).update_cart_item(cart_item_id, quantity).await
    }
    async fn delete_cart_item(&self, cart_item_id: i64) -> Result<()> {
        (**self).delete_cart_item(cart_item_id).await
    }
    async fn reset_cart(&self, user_id: i64) -> Result<()> {
        (**self).reset_cart(user_id).await
    }
}

/// HTTP client for the backend REST API.
///
/// Built once from the service config; sessions get their own copy carrying
/// the user's bearer token via [`HttpBackend::with_token`].
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    origin: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            client,
            origin: config.backend_origin.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Session-scoped copy carrying the user's bearer token.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let resp = self.request(Method::GET, path).send().await?;
        if !resp.status().is_success() {
            return Err(StorefrontError::BackendStatus {
                status: resp.status().as_u16(),
                endpoint: path.to_string(),
            });
        }
        Ok(resp.json().await?)
    }

    async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<()> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(StorefrontError::BackendStatus {
                status: resp.status().as_u16(),
                endpoint: path.to_string(),
            });
        }
        Ok(())
    }

    /// Forwards a request as-is, relaying the backend's status and JSON body.
    ///
    /// Used by the gateway proxy routes; the caller's bearer token is passed
    /// through untouched and a non-JSON body degrades to `null`.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Result<(u16, Value)> {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// Raw-body variant of [`HttpBackend::forward`] for uploads.
    pub async fn forward_bytes(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(u16, Value)> {
        let mut req = self.client.request(method, self.url(path)).body(body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Some(content_type) = content_type {
            req = req.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_cart(&self, user_id: i64) -> Result<Value> {
        self.get_json(&format!("/api/cart/user/{user_id}")).await
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Value> {
        self.get_json(&format!("/api/product/{product_id}")).await
    }

    async fn fetch_discounts(&self) -> Result<Value> {
        self.get_json("/api/discount").await
    }

    async fn create_cart_item(&self, user_id: i64, product_id: i64, quantity: u32) -> Result<()> {
        self.execute(
            Method::POST,
            "/api/cart-item",
            Some(serde_json::json!({
                "userId": user_id,
                "productId": product_id,
                "quantity": quantity,
            })),
        )
        .await
    }

    async fn update_cart_item(&self, cart_item_id: i64, quantity: u32) -> Result<()> {
        self.execute(
            Method::PUT,
            &format!("/api/cart-item/{cart_item_id}"),
            Some(serde_json::json!({ "quantity": quantity })),
        )
        .await
    }

    async fn delete_cart_item(&self, cart_item_id: i64) -> Result<()> {
        self.execute(Method::DELETE, &format!("/api/cart-item/{cart_item_id}"), None)
            .await
    }

    async fn reset_cart(&self, user_id: i64) -> Result<()> {
        self.execute(Method::POST, &format!("/api/cart/reset/{user_id}"), None)
            .await
    }
}
