//! Catalog service for the food menu.
//!
//! Reads are cached with `moka` for 5 minutes; admin mutations invalidate
//! the affected entries.

use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tasty_bites_core::{CartLine, Price, ProductId};
use tracing::{debug, instrument};

use crate::http::{ApiClient, ApiError, ApiRequest};

/// A menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(alias = "_id")]
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Price,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "file", alias = "imageUrl")]
    pub image: Option<String>,
}

impl Product {
    /// Snapshot this product as a cart line with quantity 1.
    #[must_use]
    pub fn to_cart_line(&self) -> CartLine {
        let line = CartLine::new(self.id.clone(), self.name.clone(), self.price);
        match &self.image {
            Some(image) => line.with_image(image.clone()),
            None => line,
        }
    }
}

/// Fields sent when creating or editing a menu item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub category: String,
    /// Encoded image, passed through untouched.
    #[serde(rename = "file", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Products,
}

/// Cached catalog values.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(Vec<Product>),
}

/// Client for the `/products` endpoints.
#[derive(Clone)]
pub struct CatalogService {
    client: ApiClient,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("cached_entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl CatalogService {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { client, cache }
    }

    /// List every menu item.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        if let Some(CacheValue::Products(products)) = self.cache.get(&CacheKey::Products).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let data: Value = self
            .client
            .execute(ApiRequest::get("/products"))
            .await?
            .into_data()?;
        let products = parse_product_list(data)?;

        self.cache
            .insert(CacheKey::Products, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// Fetch one menu item.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with 404 if the product does not exist.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: &ProductId) -> Result<Product, ApiError> {
        let key = CacheKey::Product(id.clone());
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self
            .client
            .execute(ApiRequest::get(format!("/products/{id}")))
            .await?
            .into_data()?;

        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Create a menu item (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, ApiError> {
        let request = ApiRequest::post("/products").json(input)?;
        let product: Product = self.client.execute(request).await?.into_data()?;
        self.cache.invalidate(&CacheKey::Products).await;
        Ok(product)
    }

    /// Edit a menu item (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self, input), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: &ProductId,
        input: &ProductInput,
    ) -> Result<Product, ApiError> {
        let request = ApiRequest::put(format!("/products/{id}")).json(input)?;
        let product: Product = self.client.execute(request).await?.into_data()?;
        self.invalidate(id).await;
        Ok(product)
    }

    /// Delete a menu item (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), ApiError> {
        self.client
            .execute(ApiRequest::delete(format!("/products/{id}")))
            .await?;
        self.invalidate(id).await;
        Ok(())
    }

    /// Drop cached reads for `id` and the full listing.
    pub async fn invalidate(&self, id: &ProductId) {
        self.cache.invalidate(&CacheKey::Product(id.clone())).await;
        self.cache.invalidate(&CacheKey::Products).await;
    }

    /// Drop every cached read.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

/// Listings come as a bare array or wrapped as `{ products }`.
fn parse_product_list(data: Value) -> Result<Vec<Product>, ApiError> {
    let list = match data {
        Value::Object(mut map) if map.contains_key("products") => {
            map.remove("products").unwrap_or(Value::Null)
        }
        Value::Null => return Ok(Vec::new()),
        other => other,
    };
    Ok(serde_json::from_value(list)?)
}
