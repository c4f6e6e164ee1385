use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable item. `is_active = false` is the soft-delete marker.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "menus")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::menu_material::Entity")]
    MenuMaterial,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::menu_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MenuMaterial.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        super::menu_material::Relation::Material.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::menu_material::Relation::Menu.def().rev())
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

        if insert {
            if matches!(active_model.created_at, ActiveValue::NotSet) {
                active_model.created_at = Set(now);
            }
            if matches!(active_model.is_active, ActiveValue::NotSet) {
                active_model.is_active = Set(true);
            }
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}
