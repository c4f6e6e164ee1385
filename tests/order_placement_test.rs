mod common;

use assert_matches::assert_matches;
use common::{cashier, cashier_order, TestApp};
use kasir_api::{
    entities::{OrderStatus, OrderType},
    errors::ServiceError,
    services::orders::{OrderLineRequest, PlaceOrderRequest},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn placing_an_order_deducts_recipe_stock_and_prices_lines() {
    let app = TestApp::new().await;
    let catalog = app.seed_es_teh().await;

    let placed = app
        .state
        .services
        .orders
        .place_order(cashier_order(&[(catalog.menu.menu.id, 5)]), Some(cashier()))
        .await
        .expect("order should be placed");

    assert_eq!(placed.order.total_price, dec!(25000));
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.order_type, OrderType::Cashier);
    assert!(placed.order.order_no.starts_with("ORD-"));
    assert!(placed.order.order_no.ends_with("-1"));
    assert_eq!(placed.order.created_by_name.as_deref(), Some("Sari"));

    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].menu_name, "Es Teh Manis");
    assert_eq!(placed.items[0].item.quantity, 5);
    assert_eq!(placed.items[0].item.price, dec!(5000));
    assert_eq!(placed.items[0].item.subtotal, dec!(25000));

    assert_eq!(app.stock_of(catalog.teh.id).await, dec!(950));
    assert_eq!(app.stock_of(catalog.gula.id).await, dec!(1900));
    assert_eq!(app.stock_of(catalog.air.id).await, dec!(8750));
}

#[tokio::test]
async fn fractional_recipe_drains_stock_to_exactly_zero() {
    let app = TestApp::new().await;
    let garam = app.seed_material("Garam", "kg", dec!(0.3), 0).await;
    let menu = app
        .seed_menu_with_quantities("Telur Asin", 4000, &[(garam.id, dec!(0.1))])
        .await;

    for _ in 0..3 {
        app.state
            .services
            .orders
            .place_order(cashier_order(&[(menu.menu.id, 1)]), Some(cashier()))
            .await
            .expect("each tenth is still in stock");
    }
    assert_eq!(app.stock_of(garam.id).await, Decimal::ZERO);

    let err = app
        .state
        .services
        .orders
        .place_order(cashier_order(&[(menu.menu.id, 1)]), Some(cashier()))
        .await
        .expect_err("stock is used up");
    assert_matches!(err, ServiceError::InsufficientStock { .. });
    assert_eq!(
        app.state.services.orders.list_orders(None).await.expect("orders").len(),
        3
    );
}

#[tokio::test]
async fn shortage_is_reported_and_nothing_is_written() {
    let app = TestApp::new().await;
    let kopi = app.seed_material("Kopi", "gram", 5, 0).await;
    let menu = app.seed_menu("Kopi Hitam", 8000, &[(kopi.id, 10)]).await;

    let can_serve = app
        .state
        .services
        .availability
        .check_can_serve(menu.menu.id, Decimal::ONE)
        .await
        .expect("can serve");
    assert!(!can_serve.can_serve);
    assert_eq!(can_serve.missing_materials, Some(vec!["Kopi".to_string()]));

    let err = app
        .state
        .services
        .orders
        .place_order(cashier_order(&[(menu.menu.id, 1)]), Some(cashier()))
        .await
        .expect_err("order must be rejected");
    assert_matches!(
        err,
        ServiceError::InsufficientStock { ref menu, ref materials }
            if menu == "Kopi Hitam" && materials == &vec!["Kopi".to_string()]
    );

    assert_eq!(app.stock_of(kopi.id).await, dec!(5));
    let orders = app
        .state
        .services
        .orders
        .list_orders(None)
        .await
        .expect("list orders");
    assert!(orders.is_empty());
}

#[tokio::test]
async fn one_short_line_rejects_the_whole_order() {
    let app = TestApp::new().await;
    let catalog = app.seed_es_teh().await;
    let susu = app.seed_material("Susu", "ml", 100, 0).await;
    let latte = app.seed_menu("Es Susu", 12000, &[(susu.id, 200)]).await;

    let err = app
        .state
        .services
        .orders
        .place_order(
            cashier_order(&[(catalog.menu.menu.id, 2), (latte.menu.id, 1)]),
            Some(cashier()),
        )
        .await
        .expect_err("second line is short");
    assert_matches!(err, ServiceError::InsufficientStock { .. });

    assert_eq!(app.stock_of(catalog.teh.id).await, dec!(1000));
    assert_eq!(app.stock_of(catalog.gula.id).await, dec!(2000));
    assert_eq!(app.stock_of(susu.id).await, dec!(100));
}

#[tokio::test]
async fn lines_sharing_a_material_are_checked_together() {
    let app = TestApp::new().await;
    let gula = app.seed_material("Gula", "gram", 50, 0).await;
    let teh = app.seed_menu("Teh Manis", 4000, &[(gula.id, 20)]).await;
    let kopi = app.seed_menu("Kopi Manis", 6000, &[(gula.id, 20)]).await;

    // Each line alone fits, together they need 60 of 50.
    let err = app
        .state
        .services
        .orders
        .place_order(
            cashier_order(&[(teh.menu.id, 1), (kopi.menu.id, 2)]),
            Some(cashier()),
        )
        .await
        .expect_err("combined demand exceeds stock");
    assert_matches!(err, ServiceError::InsufficientStock { ref materials, .. } if materials == &vec!["Gula".to_string()]);
    assert_eq!(app.stock_of(gula.id).await, dec!(50));

    let placed = app
        .state
        .services
        .orders
        .place_order(
            cashier_order(&[(teh.menu.id, 1), (kopi.menu.id, 1)]),
            Some(cashier()),
        )
        .await
        .expect("combined demand fits");
    assert_eq!(placed.order.total_price, dec!(10000));
    assert_eq!(app.stock_of(gula.id).await, dec!(10));
}

#[tokio::test]
async fn unknown_and_inactive_menus_are_rejected() {
    let app = TestApp::new().await;
    let catalog = app.seed_es_teh().await;

    let err = app
        .state
        .services
        .orders
        .place_order(cashier_order(&[(Uuid::new_v4(), 1)]), Some(cashier()))
        .await
        .expect_err("unknown menu");
    assert_matches!(err, ServiceError::NotFound(_));

    app.state
        .services
        .recipes
        .delete_menu(catalog.menu.menu.id)
        .await
        .expect("deactivate menu");

    let err = app
        .state
        .services
        .orders
        .place_order(cashier_order(&[(catalog.menu.menu.id, 1)]), Some(cashier()))
        .await
        .expect_err("inactive menu");
    assert_matches!(err, ServiceError::InvalidOrder(_));
    assert_eq!(app.stock_of(catalog.teh.id).await, dec!(1000));
}

#[tokio::test]
async fn request_shape_is_validated_before_stock_is_read() {
    let app = TestApp::new().await;
    let catalog = app.seed_es_teh().await;
    let orders = &app.state.services.orders;

    let err = orders
        .place_order(cashier_order(&[]), Some(cashier()))
        .await
        .expect_err("empty order");
    assert_matches!(err, ServiceError::InvalidOrder(_));

    let err = orders
        .place_order(cashier_order(&[(catalog.menu.menu.id, 0)]), Some(cashier()))
        .await
        .expect_err("zero quantity");
    assert_matches!(err, ServiceError::InvalidOrder(_));

    let err = orders
        .place_order(cashier_order(&[(catalog.menu.menu.id, 1)]), None)
        .await
        .expect_err("cashier order without actor");
    assert_matches!(err, ServiceError::Unauthorized(_));

    let err = orders
        .place_order(
            PlaceOrderRequest {
                items: vec![OrderLineRequest {
                    menu_id: catalog.menu.menu.id,
                    quantity: 1,
                }],
                customer_name: Some("   ".to_string()),
                order_type: OrderType::SelfOrder,
            },
            None,
        )
        .await
        .expect_err("self-order without a name");
    assert_matches!(err, ServiceError::InvalidOrder(_));

    assert_eq!(app.stock_of(catalog.teh.id).await, dec!(1000));
}

#[tokio::test]
async fn self_order_records_customer_and_no_staff() {
    let app = TestApp::new().await;
    let catalog = app.seed_es_teh().await;

    let placed = app
        .state
        .services
        .orders
        .place_order(
            PlaceOrderRequest {
                items: vec![OrderLineRequest {
                    menu_id: catalog.menu.menu.id,
                    quantity: 2,
                }],
                customer_name: Some("  Budi ".to_string()),
                order_type: OrderType::SelfOrder,
            },
            Some(cashier()),
        )
        .await
        .expect("self order");

    assert_eq!(placed.order.order_type, OrderType::SelfOrder);
    assert_eq!(placed.order.customer_name.as_deref(), Some("Budi"));
    assert_eq!(placed.order.created_by, None);
    assert_eq!(placed.order.created_by_name, None);
}

#[tokio::test]
async fn order_round_trips_and_numbers_increase() {
    let app = TestApp::new().await;
    let catalog = app.seed_es_teh().await;
    let orders = &app.state.services.orders;

    let first = orders
        .place_order(cashier_order(&[(catalog.menu.menu.id, 1)]), Some(cashier()))
        .await
        .expect("first order");
    let second = orders
        .place_order(cashier_order(&[(catalog.menu.menu.id, 3)]), Some(cashier()))
        .await
        .expect("second order");
    assert_ne!(first.order.order_no, second.order.order_no);
    assert!(second.order.order_no.ends_with("-2"));

    let fetched = orders.get_order(second.order.id).await.expect("get order");
    assert_eq!(fetched.order.id, second.order.id);
    assert_eq!(fetched.order.order_no, second.order.order_no);
    assert_eq!(fetched.order.total_price, dec!(15000));
    assert_eq!(fetched.items.len(), 1);
    assert_eq!(fetched.items[0].menu_name, "Es Teh Manis");
    assert_eq!(fetched.items[0].item.subtotal, dec!(15000));

    let listed = orders.list_orders(None).await.expect("list");
    assert_eq!(listed.len(), 2);
    let pending = orders
        .list_orders(Some(OrderStatus::Pending))
        .await
        .expect("list pending");
    assert_eq!(pending.len(), 2);
    let completed = orders
        .list_orders(Some(OrderStatus::Completed))
        .await
        .expect("list completed");
    assert!(completed.is_empty());

    assert_eq!(app.stock_of(catalog.teh.id).await, dec!(960));
    let missing = orders.get_order(Uuid::new_v4()).await.expect_err("missing");
    assert_matches!(missing, ServiceError::NotFound(_));
}

#[tokio::test]
async fn draining_stock_flips_availability() {
    let app = TestApp::new().await;
    let catalog = app.seed_es_teh().await;
    let availability = &app.state.services.availability;

    assert!(availability
        .get_menu_availability(catalog.menu.menu.id)
        .await
        .expect("availability"));

    // Air runs out first: 10000 / 250 = 40 portions.
    app.state
        .services
        .orders
        .place_order(cashier_order(&[(catalog.menu.menu.id, 40)]), Some(cashier()))
        .await
        .expect("drain air");

    assert_eq!(app.stock_of(catalog.air.id).await, Decimal::ZERO);
    assert_eq!(app.stock_of(catalog.gula.id).await, dec!(1200));
    assert!(!availability
        .get_menu_availability(catalog.menu.menu.id)
        .await
        .expect("availability"));

    let listed = availability
        .list_menus_with_availability()
        .await
        .expect("menus");
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].is_available);
}
