use crate::{
    entities::{category, Category},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Category catalog: pure lookup/update, no business rules beyond
/// title/slug uniqueness.
#[derive(Clone)]
pub struct CategoryService {
    db: Arc<DatabaseConnection>,
}

impl CategoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a category; the slug is generated from the title when omitted.
    #[instrument(skip(self))]
    pub async fn create(&self, input: CreateCategoryInput) -> Result<category::Model, ServiceError> {
        let slug = input.slug.unwrap_or_else(|| slugify(&input.title));

        if self.find_by_slug(&slug).await?.is_some() {
            return Err(ServiceError::AlreadyExists(
                "Category with this slug".to_string(),
            ));
        }

        let category = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(input.title),
            slug: Set(slug),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(category_id = %category.id, "category created");
        Ok(category)
    }

    pub async fn get_all(&self) -> Result<Vec<category::Model>, ServiceError> {
        let categories = Category::find()
            .order_by_asc(category::Column::Title)
            .all(&*self.db)
            .await?;

        if categories.is_empty() {
            return Err(ServiceError::NotFound("Category".to_string()));
        }
        Ok(categories)
    }

    pub async fn get_by_id(&self, category_id: Uuid) -> Result<category::Model, ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Category".to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<category::Model, ServiceError> {
        self.find_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Category".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn update(
        &self,
        category_id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        if let Some(slug) = &input.slug {
            if let Some(existing) = self.find_by_slug(slug).await? {
                if existing.id != category_id {
                    return Err(ServiceError::AlreadyExists(
                        "Category with this slug".to_string(),
                    ));
                }
            }
        }

        let category = self.get_by_id(category_id).await?;
        let mut active: category::ActiveModel = category.into();
        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(slug) = input.slug {
            active.slug = Set(slug);
        }

        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, category_id: Uuid) -> Result<(), ServiceError> {
        let category = self.get_by_id(category_id).await?;
        Category::delete_by_id(category.id).exec(&*self.db).await?;
        info!(%category_id, "category deleted");
        Ok(())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<category::Model>, ServiceError> {
        Ok(Category::find()
            .filter(category::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?)
    }
}

/// Lowercases the title and collapses non-alphanumeric runs into single
/// hyphens.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Input for creating a category
#[derive(Debug, Deserialize)]
pub struct CreateCategoryInput {
    pub title: String,
    pub slug: Option<String>,
}

/// Input for updating a category
#[derive(Debug, Deserialize)]
pub struct UpdateCategoryInput {
    pub title: Option<String>,
    pub slug: Option<String>,
}
