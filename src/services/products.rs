use crate::{
    entities::{product, Category, Product},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Product catalog: lookups for the cart and storefront, title-unique
/// create/update for administrators.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, input: CreateProductInput) -> Result<product::Model, ServiceError> {
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "product price must be non-negative".to_string(),
            ));
        }

        if self.find_by_title(&input.title).await?.is_some() {
            return Err(ServiceError::AlreadyExists(
                "Product with this title".to_string(),
            ));
        }

        Category::find_by_id(input.category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Category".to_string()))?;

        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(input.title),
            description: Set(input.description),
            price: Set(input.price),
            category_id: Set(input.category_id),
            image: Set(input.image),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    pub async fn get_all(&self) -> Result<Vec<product::Model>, ServiceError> {
        let products = Product::find()
            .order_by_asc(product::Column::Title)
            .all(&*self.db)
            .await?;

        if products.is_empty() {
            return Err(ServiceError::NotFound("Product".to_string()));
        }
        Ok(products)
    }

    pub async fn get_by_id(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product".to_string()))
    }

    pub async fn get_by_category(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<product::Model>, ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Category".to_string()))?;

        let products = Product::find()
            .filter(product::Column::CategoryId.eq(category_id))
            .order_by_asc(product::Column::Title)
            .all(&*self.db)
            .await?;

        if products.is_empty() {
            return Err(ServiceError::NotFound("Product".to_string()));
        }
        Ok(products)
    }

    #[instrument(skip(self))]
    pub async fn update(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "product price must be non-negative".to_string(),
                ));
            }
        }

        if let Some(title) = &input.title {
            if let Some(existing) = self.find_by_title(title).await? {
                if existing.id != product_id {
                    return Err(ServiceError::AlreadyExists(
                        "Product with this title".to_string(),
                    ));
                }
            }
        }

        let product = self.get_by_id(product_id).await?;
        let mut active: product::ActiveModel = product.into();
        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(category_id) = input.category_id {
            Category::find_by_id(category_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Category".to_string()))?;
            active.category_id = Set(category_id);
        }
        if let Some(image) = input.image {
            active.image = Set(Some(image));
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let product = self.get_by_id(product_id).await?;
        Product::delete_by_id(product.id).exec(&*self.db).await?;
        info!(%product_id, "product deleted");
        Ok(())
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<product::Model>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::Title.eq(title))
            .one(&*self.db)
            .await?)
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category_id: Uuid,
    pub image: Option<String>,
}

/// Input for updating a product
#[derive(Debug, Deserialize)]
pub struct UpdateProductInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub image: Option<String>,
}
