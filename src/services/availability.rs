//! Menu availability.
//!
//! Availability is derived on every read from the recipe lines of a menu and
//! the current stock of the materials they consume. Nothing here is
//! persisted or cached. The evaluation itself ([`evaluate`]) is a pure
//! function; the service only gathers a consistent snapshot for it.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{material, menu, menu_material},
    errors::ServiceError,
};

/// A recipe line joined with the stock of its material at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct StockedLine {
    pub material_id: Uuid,
    pub material_name: String,
    pub unit: String,
    /// Amount consumed per unit of the menu sold.
    pub required: Decimal,
    pub stock: Decimal,
}

/// Outcome of evaluating one menu for a requested quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    NotFound,
    Inactive,
    /// Active, but these materials cannot cover the requested quantity.
    Short(Vec<String>),
    Servable,
}

impl Verdict {
    pub fn is_servable(&self) -> bool {
        matches!(self, Verdict::Servable)
    }
}

/// Names of the materials whose stock is below `required * quantity`, in recipe order.
pub fn missing_materials(lines: &[StockedLine], quantity: Decimal) -> Vec<String> {
    lines
        .iter()
        .filter(|line| match line.required.checked_mul(quantity) {
            Some(needed) => line.stock < needed,
            None => true,
        })
        .map(|line| line.material_name.clone())
        .collect()
}

/// Evaluates whether `quantity` units of a menu can be produced right now.
pub fn evaluate(menu: Option<&menu::Model>, lines: &[StockedLine], quantity: Decimal) -> Verdict {
    let Some(menu) = menu else {
        return Verdict::NotFound;
    };
    if !menu.is_active {
        return Verdict::Inactive;
    }

    let missing = missing_materials(lines, quantity);
    if missing.is_empty() {
        Verdict::Servable
    } else {
        Verdict::Short(missing)
    }
}

/// Availability of one unit, the flag shown on catalog reads.
pub fn is_available(menu: &menu::Model, lines: &[StockedLine]) -> bool {
    evaluate(Some(menu), lines, Decimal::ONE).is_servable()
}

/// Response of `check_can_serve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanServe {
    pub can_serve: bool,
    /// Present only when an active menu is short of materials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_materials: Option<Vec<String>>,
}

impl From<Verdict> for CanServe {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::NotFound | Verdict::Inactive => CanServe {
                can_serve: false,
                missing_materials: None,
            },
            Verdict::Short(missing) => CanServe {
                can_serve: false,
                missing_materials: Some(missing),
            },
            Verdict::Servable => CanServe {
                can_serve: true,
                missing_materials: None,
            },
        }
    }
}

/// A menu annotated with its derived availability flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuWithAvailability {
    #[serde(flatten)]
    pub menu: menu::Model,
    pub is_available: bool,
}

fn stocked_line(line: menu_material::Model, material: Option<material::Model>) -> StockedLine {
    match material {
        Some(material) => StockedLine {
            material_id: material.id,
            material_name: material.name,
            unit: material.unit,
            required: line.quantity.to_decimal(),
            stock: material.stock.to_decimal(),
        },
        // The foreign key forbids this; a dangling line can never be satisfied.
        None => StockedLine {
            material_id: line.material_id,
            material_name: line.material_id.to_string(),
            unit: String::new(),
            required: line.quantity.to_decimal(),
            stock: Decimal::ZERO,
        },
    }
}

/// Loads the recipe lines of `menu_ids` joined with current material stock, in one query.
pub(crate) async fn load_stocked_lines<C>(
    conn: &C,
    menu_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<StockedLine>>, DbErr>
where
    C: ConnectionTrait,
{
    let rows = menu_material::Entity::find()
        .filter(menu_material::Column::MenuId.is_in(menu_ids.iter().copied()))
        .find_also_related(material::Entity)
        .order_by_asc(menu_material::Column::MenuId)
        .order_by_asc(material::Column::Name)
        .all(conn)
        .await?;

    let mut by_menu: HashMap<Uuid, Vec<StockedLine>> = HashMap::new();
    for (line, material) in rows {
        by_menu
            .entry(line.menu_id)
            .or_default()
            .push(stocked_line(line, material));
    }
    Ok(by_menu)
}

/// Annotates every menu from one snapshot of recipe lines and materials.
pub fn annotate_menus(
    menus: Vec<menu::Model>,
    lines: &[menu_material::Model],
    materials: &[material::Model],
) -> Vec<MenuWithAvailability> {
    let materials: HashMap<Uuid, &material::Model> =
        materials.iter().map(|m| (m.id, m)).collect();

    let mut by_menu: HashMap<Uuid, Vec<StockedLine>> = HashMap::new();
    for line in lines {
        let material = materials.get(&line.material_id).map(|m| (*m).clone());
        by_menu
            .entry(line.menu_id)
            .or_default()
            .push(stocked_line(line.clone(), material));
    }

    menus
        .into_iter()
        .map(|menu| {
            let lines = by_menu.get(&menu.id).map(Vec::as_slice).unwrap_or(&[]);
            let is_available = is_available(&menu, lines);
            MenuWithAvailability { menu, is_available }
        })
        .collect()
}

#[derive(Clone)]
pub struct AvailabilityService {
    db: Arc<DbPool>,
}

impl AvailabilityService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Evaluates a menu for `quantity` units against current stock.
    #[instrument(skip(self))]
    pub async fn verdict(&self, menu_id: Uuid, quantity: Decimal) -> Result<Verdict, ServiceError> {
        let db = &*self.db;

        let menu = menu::Entity::find_by_id(menu_id)
            .one(db)
            .await
            .map_err(|e| {
                error!("Failed to fetch menu {}: {}", menu_id, e);
                ServiceError::db_error(e)
            })?;

        let lines = match &menu {
            Some(_) => load_stocked_lines(db, &[menu_id])
                .await
                .map_err(ServiceError::db_error)?
                .remove(&menu_id)
                .unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(evaluate(menu.as_ref(), &lines, quantity))
    }

    /// `{canServe, missingMaterials?}` for a menu and a positive quantity.
    #[instrument(skip(self))]
    pub async fn check_can_serve(
        &self,
        menu_id: Uuid,
        quantity: Decimal,
    ) -> Result<CanServe, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let verdict = self.verdict(menu_id, quantity).await?;
        debug!(?verdict, "Evaluated menu availability");
        Ok(verdict.into())
    }

    /// Whether one unit of the menu can currently be sold.
    #[instrument(skip(self))]
    pub async fn get_menu_availability(&self, menu_id: Uuid) -> Result<bool, ServiceError> {
        match self.verdict(menu_id, Decimal::ONE).await? {
            Verdict::NotFound => Err(ServiceError::NotFound(format!(
                "Menu {} not found",
                menu_id
            ))),
            verdict => Ok(verdict.is_servable()),
        }
    }

    /// Every menu, active or not, newest first, with `isAvailable` computed
    /// from a single read snapshot.
    #[instrument(skip(self))]
    pub async fn list_menus_with_availability(
        &self,
    ) -> Result<Vec<MenuWithAvailability>, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!("Failed to begin read transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        let menus = menu::Entity::find()
            .order_by_desc(menu::Column::CreatedAt)
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let lines = menu_material::Entity::find()
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let materials = material::Entity::find()
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        Ok(annotate_menus(menus, &lines, &materials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Quantity;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn menu(is_active: bool) -> menu::Model {
        menu::Model {
            id: Uuid::new_v4(),
            name: "Es Teh Manis".into(),
            description: None,
            price: dec!(5000),
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(name: &str, required: Decimal, stock: Decimal) -> StockedLine {
        StockedLine {
            material_id: Uuid::new_v4(),
            material_name: name.into(),
            unit: "g".into(),
            required,
            stock,
        }
    }

    #[test]
    fn nonexistent_menu_cannot_be_served_without_detail() {
        let verdict = evaluate(None, &[], Decimal::ONE);
        assert_eq!(verdict, Verdict::NotFound);
        assert_eq!(
            CanServe::from(verdict),
            CanServe {
                can_serve: false,
                missing_materials: None
            }
        );
    }

    #[test]
    fn inactive_menu_hides_missing_materials() {
        let lines = [line("Teh", dec!(10), dec!(0))];
        let verdict = evaluate(Some(&menu(false)), &lines, Decimal::ONE);
        assert_eq!(verdict, Verdict::Inactive);
        assert!(CanServe::from(verdict).missing_materials.is_none());
    }

    #[test]
    fn short_material_is_named() {
        let lines = [
            line("Teh", dec!(10), dec!(1000)),
            line("Gula", dec!(10), dec!(5)),
        ];
        let verdict = evaluate(Some(&menu(true)), &lines, Decimal::ONE);
        assert_eq!(verdict, Verdict::Short(vec!["Gula".to_string()]));
    }

    #[test]
    fn requested_quantity_scales_requirement() {
        let lines = [line("Teh", dec!(10), dec!(50))];
        let active = menu(true);
        assert!(evaluate(Some(&active), &lines, dec!(5)).is_servable());
        assert_eq!(
            evaluate(Some(&active), &lines, dec!(6)),
            Verdict::Short(vec!["Teh".to_string()])
        );
    }

    #[test]
    fn servable_menu_omits_missing_materials() {
        let lines = [line("Teh", dec!(10), dec!(1000))];
        let can_serve = CanServe::from(evaluate(Some(&menu(true)), &lines, Decimal::ONE));
        assert!(can_serve.can_serve);
        assert_eq!(can_serve.missing_materials, None);

        let json = serde_json::to_value(&can_serve).unwrap();
        assert_eq!(json, serde_json::json!({"canServe": true}));
    }

    #[test]
    fn exact_stock_is_enough() {
        let lines = [line("Air", dec!(250), dec!(250))];
        assert!(is_available(&menu(true), &lines));
    }

    #[test]
    fn annotate_uses_shared_snapshot() {
        let teh = material::Model {
            id: Uuid::new_v4(),
            name: "Teh".into(),
            unit: "gram".into(),
            stock: Quantity::from_milli(5_000),
            min_stock: Quantity::from_milli(100_000),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let needs_teh = menu(true);
        let no_recipe = menu(true);
        let lines = vec![menu_material::Model {
            id: Uuid::new_v4(),
            menu_id: needs_teh.id,
            material_id: teh.id,
            quantity: Quantity::from_milli(10_000),
        }];

        let annotated = annotate_menus(vec![needs_teh, no_recipe], &lines, &[teh]);
        assert!(!annotated[0].is_available);
        assert!(annotated[1].is_available);
    }

    fn arb_lines() -> impl Strategy<Value = Vec<StockedLine>> {
        prop::collection::vec((1u32..500, 0u32..5000), 0..6).prop_map(|pairs| {
            pairs
                .into_iter()
                .enumerate()
                .map(|(i, (required, stock))| {
                    line(
                        &format!("m{i}"),
                        Decimal::from(required),
                        Decimal::from(stock),
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn empty_recipe_availability_equals_active_flag(active in any::<bool>()) {
            prop_assert_eq!(is_available(&menu(active), &[]), active);
        }

        #[test]
        fn inactive_menu_is_never_available(lines in arb_lines()) {
            prop_assert!(!is_available(&menu(false), &lines));
        }

        #[test]
        fn available_iff_every_line_is_covered(lines in arb_lines()) {
            let expected = lines.iter().all(|l| l.required <= l.stock);
            prop_assert_eq!(is_available(&menu(true), &lines), expected);
        }

        #[test]
        fn evaluation_is_repeatable(lines in arb_lines(), qty in 1u32..20) {
            let active = menu(true);
            let qty = Decimal::from(qty);
            prop_assert_eq!(
                evaluate(Some(&active), &lines, qty),
                evaluate(Some(&active), &lines, qty)
            );
        }
    }
}
