use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{material, menu, menu_material, Quantity},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMaterialRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "Unit must be 1-20 characters"))]
    pub unit: String,
    pub stock: Decimal,
    pub min_stock: Decimal,
}

/// Partial material update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMaterialRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Unit must be 1-20 characters"))]
    pub unit: Option<String>,
    pub stock: Option<Decimal>,
    pub min_stock: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockRequest {
    /// Positive to restock, negative to write off.
    pub delta: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialResponse {
    #[serde(flatten)]
    pub material: material::Model,
    pub is_low_stock: bool,
}

impl From<material::Model> for MaterialResponse {
    fn from(material: material::Model) -> Self {
        let is_low_stock = material.is_low_stock();
        Self {
            material,
            is_low_stock,
        }
    }
}

/// A menu whose recipe consumes the material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialUsage {
    pub menu_id: Uuid,
    pub menu_name: String,
    pub is_active: bool,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialDetail {
    #[serde(flatten)]
    pub material: MaterialResponse,
    pub menus: Vec<MaterialUsage>,
}

fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

/// Conditionally lowers a material's stock by `amount`.
///
/// Runs `UPDATE materials SET stock = stock - amount WHERE id = ? AND stock >= amount`
/// on integer thousandths, so the comparison and the subtraction are exact.
/// Returns `false` when no row matched, i.e. the stock could not cover the
/// amount or the material is gone. Callers inside a transaction must roll back.
pub(crate) async fn try_decrement<C>(conn: &C, material_id: Uuid, amount: Quantity) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let result = material::Entity::update_many()
        .col_expr(
            material::Column::Stock,
            Expr::col(material::Column::Stock).sub(amount),
        )
        .col_expr(material::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(material::Column::Id.eq(material_id))
        .filter(material::Column::Stock.gte(amount))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Atomically raises a material's stock by `amount`.
pub(crate) async fn increment<C>(conn: &C, material_id: Uuid, amount: Quantity) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let result = material::Entity::update_many()
        .col_expr(
            material::Column::Stock,
            Expr::col(material::Column::Stock).add(amount),
        )
        .col_expr(material::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(material::Column::Id.eq(material_id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Material catalog and stock levels
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn find_material(&self, material_id: Uuid) -> Result<material::Model, ServiceError> {
        material::Entity::find_by_id(material_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch material {}: {}", material_id, e);
                ServiceError::db_error(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", material_id)))
    }

    /// All materials, newest first.
    #[instrument(skip(self))]
    pub async fn list_materials(&self) -> Result<Vec<MaterialResponse>, ServiceError> {
        let materials = material::Entity::find()
            .order_by_desc(material::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(materials.into_iter().map(MaterialResponse::from).collect())
    }

    /// Materials at or below their minimum stock, scarcest first.
    #[instrument(skip(self))]
    pub async fn list_low_stock(&self) -> Result<Vec<MaterialResponse>, ServiceError> {
        let materials = material::Entity::find()
            .filter(Expr::col(material::Column::Stock).lte(Expr::col(material::Column::MinStock)))
            .order_by_asc(material::Column::Stock)
            .order_by_asc(material::Column::Name)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(materials.into_iter().map(MaterialResponse::from).collect())
    }

    #[instrument(skip(self), fields(material_id = %material_id))]
    pub async fn get_material(&self, material_id: Uuid) -> Result<MaterialDetail, ServiceError> {
        let material = self.find_material(material_id).await?;

        let usages = menu_material::Entity::find()
            .filter(menu_material::Column::MaterialId.eq(material_id))
            .find_also_related(menu::Entity)
            .order_by_asc(menu::Column::Name)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        let menus = usages
            .into_iter()
            .filter_map(|(line, menu)| {
                menu.map(|menu| MaterialUsage {
                    menu_id: menu.id,
                    menu_name: menu.name,
                    is_active: menu.is_active,
                    quantity: line.quantity.to_decimal(),
                })
            })
            .collect();

        Ok(MaterialDetail {
            material: material.into(),
            menus,
        })
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_material(
        &self,
        request: CreateMaterialRequest,
    ) -> Result<material::Model, ServiceError> {
        request.validate()?;
        ensure_non_negative("stock", request.stock)?;
        ensure_non_negative("minStock", request.min_stock)?;
        let stock = Quantity::try_from(request.stock)?;
        let min_stock = Quantity::try_from(request.min_stock)?;

        let model = material::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            unit: Set(request.unit.trim().to_string()),
            stock: Set(stock),
            min_stock: Set(min_stock),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create material");
            ServiceError::db_error(e)
        })?;

        info!(material_id = %model.id, "Material created");
        Ok(model)
    }

    /// Direct edit of a material, including manual restock by setting `stock`.
    #[instrument(skip(self, request), fields(material_id = %material_id))]
    pub async fn update_material(
        &self,
        material_id: Uuid,
        request: UpdateMaterialRequest,
    ) -> Result<material::Model, ServiceError> {
        request.validate()?;
        if let Some(stock) = request.stock {
            ensure_non_negative("stock", stock)?;
        }
        if let Some(min_stock) = request.min_stock {
            ensure_non_negative("minStock", min_stock)?;
        }
        let stock = request.stock.map(Quantity::try_from).transpose()?;
        let min_stock = request.min_stock.map(Quantity::try_from).transpose()?;

        let existing = self.find_material(material_id).await?;
        let mut active: material::ActiveModel = existing.into();

        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(unit) = request.unit {
            active.unit = Set(unit.trim().to_string());
        }
        if let Some(stock) = stock {
            active.stock = Set(stock);
        }
        if let Some(min_stock) = min_stock {
            active.min_stock = Set(min_stock);
        }

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, "Failed to update material");
            ServiceError::db_error(e)
        })?;

        info!("Material updated");
        Ok(updated)
    }

    /// Deletes a material that no recipe references.
    #[instrument(skip(self), fields(material_id = %material_id))]
    pub async fn delete_material(&self, material_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let material = self.find_material(material_id).await?;

        let references = menu_material::Entity::find()
            .filter(menu_material::Column::MaterialId.eq(material_id))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        if references > 0 {
            return Err(ServiceError::Conflict(format!(
                "Material {} is used by {} menu recipe(s)",
                material.name, references
            )));
        }

        material::Entity::delete_by_id(material_id)
            .exec(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete material");
                ServiceError::db_error(e)
            })?;

        info!("Material deleted");
        Ok(())
    }

    /// Adds `delta` to the stock. A negative delta goes through the
    /// conditional decrement and never takes stock below zero.
    #[instrument(skip(self), fields(material_id = %material_id, delta = %delta))]
    pub async fn adjust_stock(
        &self,
        material_id: Uuid,
        delta: Decimal,
    ) -> Result<material::Model, ServiceError> {
        if delta.is_zero() {
            return Err(ServiceError::ValidationError(
                "Adjustment must not be zero".to_string(),
            ));
        }

        let amount = Quantity::try_from(delta.abs())?;

        let db = &*self.db_pool;
        let applied = if delta > Decimal::ZERO {
            increment(db, material_id, amount).await
        } else {
            try_decrement(db, material_id, amount).await
        }
        .map_err(|e| {
            error!(error = %e, "Failed to adjust stock");
            ServiceError::db_error(e)
        })?;

        if !applied {
            // Either the material is gone or the stock could not cover the write-off.
            let material = self.find_material(material_id).await?;
            return Err(ServiceError::insufficient("stock adjustment", material.name));
        }

        let material = self.find_material(material_id).await?;
        info!(stock = %material.stock, "Stock adjusted");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::MaterialRestocked {
                    material_id,
                    delta,
                    stock: material.stock.to_decimal(),
                })
                .await;
            let was_above = material
                .stock
                .checked_add(amount)
                .is_some_and(|before| before > material.min_stock);
            if delta < Decimal::ZERO && material.is_low_stock() && was_above {
                sender
                    .send_or_log(Event::LowStock {
                        material_id,
                        name: material.name.clone(),
                        stock: material.stock.to_decimal(),
                        min_stock: material.min_stock.to_decimal(),
                    })
                    .await;
            }
        }

        Ok(material)
    }
}
