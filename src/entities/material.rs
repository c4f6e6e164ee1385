use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Quantity;

/// A raw ingredient tracked by quantity in its own unit of measure.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "materials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    /// Never negative; only the conditional decrement lowers it.
    #[sea_orm(column_type = "BigInteger")]
    pub stock: Quantity,
    /// Advisory threshold for the low stock flag.
    #[sea_orm(column_type = "BigInteger")]
    pub min_stock: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::menu_material::Entity")]
    MenuMaterial,
}

impl Related<super::menu_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MenuMaterial.def()
    }
}

impl Related<super::menu::Entity> for Entity {
    fn to() -> RelationDef {
        super::menu_material::Relation::Menu.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::menu_material::Relation::Material.def().rev())
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert && matches!(active_model.created_at, ActiveValue::NotSet) {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}
