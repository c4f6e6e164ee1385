use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{material, menu, menu_material, order_item, Quantity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::availability::{self, StockedLine},
};

/// One recipe line as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLineInput {
    pub material_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMenuRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub price: Decimal,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub materials: Vec<RecipeLineInput>,
}

/// Menu edit. The recipe is always replaced as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMenuRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
    pub materials: Vec<RecipeLineInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLineDetail {
    pub material_id: Uuid,
    pub name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub stock: Decimal,
}

impl From<StockedLine> for RecipeLineDetail {
    fn from(line: StockedLine) -> Self {
        Self {
            material_id: line.material_id,
            name: line.material_name,
            unit: line.unit,
            quantity: line.required,
            stock: line.stock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuDetail {
    #[serde(flatten)]
    pub menu: menu::Model,
    pub is_available: bool,
    pub materials: Vec<RecipeLineDetail>,
}

fn ensure_positive_price(price: Decimal) -> Result<(), ServiceError> {
    if price <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Price must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Checks the shape of a recipe: positive quantities of at most three
/// decimal places and one line per material.
pub fn validate_recipe(lines: &[RecipeLineInput]) -> Result<(), ServiceError> {
    let mut seen = HashSet::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for material {} must be positive",
                line.material_id
            )));
        }
        Quantity::try_from(line.quantity)?;
        if !seen.insert(line.material_id) {
            return Err(ServiceError::ValidationError(format!(
                "Material {} appears more than once in the recipe",
                line.material_id
            )));
        }
    }
    Ok(())
}

async fn ensure_materials_exist<C>(conn: &C, lines: &[RecipeLineInput]) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if lines.is_empty() {
        return Ok(());
    }

    let ids: Vec<Uuid> = lines.iter().map(|l| l.material_id).collect();
    let found: HashSet<Uuid> = material::Entity::find()
        .filter(material::Column::Id.is_in(ids.iter().copied()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|m| m.id)
        .collect();

    match ids.into_iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(ServiceError::NotFound(format!(
            "Material {} not found",
            missing
        ))),
        None => Ok(()),
    }
}

async fn insert_recipe(
    txn: &DatabaseTransaction,
    menu_id: Uuid,
    lines: &[RecipeLineInput],
) -> Result<(), ServiceError> {
    for line in lines {
        menu_material::ActiveModel {
            id: Set(Uuid::new_v4()),
            menu_id: Set(menu_id),
            material_id: Set(line.material_id),
            quantity: Set(Quantity::try_from(line.quantity)?),
        }
        .insert(txn)
        .await
        .map_err(|e| {
            error!(error = %e, %menu_id, "Failed to insert recipe line");
            ServiceError::db_error(e)
        })?;
    }
    Ok(())
}

/// Menus and their recipes
#[derive(Clone)]
pub struct RecipeService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl RecipeService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    /// A menu with its recipe joined to current stock and its availability.
    #[instrument(skip(self), fields(menu_id = %menu_id))]
    pub async fn get_menu(&self, menu_id: Uuid) -> Result<MenuDetail, ServiceError> {
        let db = &*self.db_pool;
        let menu = menu::Entity::find_by_id(menu_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Menu {} not found", menu_id)))?;

        let lines = availability::load_stocked_lines(db, &[menu_id])
            .await
            .map_err(ServiceError::db_error)?
            .remove(&menu_id)
            .unwrap_or_default();

        let is_available = availability::is_available(&menu, &lines);
        Ok(MenuDetail {
            menu,
            is_available,
            materials: lines.into_iter().map(RecipeLineDetail::from).collect(),
        })
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_menu(&self, request: CreateMenuRequest) -> Result<MenuDetail, ServiceError> {
        request.validate()?;
        ensure_positive_price(request.price)?;
        validate_recipe(&request.materials)?;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction for menu creation");
            ServiceError::db_error(e)
        })?;

        ensure_materials_exist(&txn, &request.materials).await?;

        let menu_id = Uuid::new_v4();
        menu::ActiveModel {
            id: Set(menu_id),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            price: Set(request.price),
            is_active: Set(request.is_active.unwrap_or(true)),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert menu");
            ServiceError::db_error(e)
        })?;

        insert_recipe(&txn, menu_id, &request.materials).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %menu_id, "Failed to commit menu creation");
            ServiceError::db_error(e)
        })?;

        info!(%menu_id, lines = request.materials.len(), "Menu created");
        self.get_menu(menu_id).await
    }

    /// Updates menu fields and replaces the entire recipe in one transaction.
    #[instrument(skip(self, request), fields(menu_id = %menu_id))]
    pub async fn update_menu(
        &self,
        menu_id: Uuid,
        request: UpdateMenuRequest,
    ) -> Result<MenuDetail, ServiceError> {
        request.validate()?;
        if request.materials.is_empty() {
            return Err(ServiceError::ValidationError(
                "A menu needs at least one material".to_string(),
            ));
        }
        if let Some(price) = request.price {
            ensure_positive_price(price)?;
        }
        validate_recipe(&request.materials)?;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction for menu update");
            ServiceError::db_error(e)
        })?;

        let existing = menu::Entity::find_by_id(menu_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Menu {} not found", menu_id)))?;

        ensure_materials_exist(&txn, &request.materials).await?;

        menu_material::Entity::delete_many()
            .filter(menu_material::Column::MenuId.eq(menu_id))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to clear recipe");
                ServiceError::db_error(e)
            })?;
        insert_recipe(&txn, menu_id, &request.materials).await?;

        let mut active: menu::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to update menu");
            ServiceError::db_error(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit menu update");
            ServiceError::db_error(e)
        })?;

        info!(lines = request.materials.len(), "Menu updated, recipe replaced");
        self.publish(Event::RecipeReplaced {
            menu_id,
            lines: request.materials.len(),
        })
        .await;

        self.get_menu(menu_id).await
    }

    /// Hides a menu from sale. Menus that were ever ordered are kept as is.
    #[instrument(skip(self), fields(menu_id = %menu_id))]
    pub async fn delete_menu(&self, menu_id: Uuid) -> Result<menu::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = menu::Entity::find_by_id(menu_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Menu {} not found", menu_id)))?;

        let ordered = order_item::Entity::find()
            .filter(order_item::Column::MenuId.eq(menu_id))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        if ordered > 0 {
            return Err(ServiceError::Conflict(format!(
                "Menu {} has order history and cannot be deleted",
                existing.name
            )));
        }

        let mut active: menu::ActiveModel = existing.into();
        active.is_active = Set(false);
        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, "Failed to deactivate menu");
            ServiceError::db_error(e)
        })?;

        info!("Menu deactivated");
        Ok(updated)
    }
}
