use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_materials_table::Migration),
            Box::new(m20240101_000002_create_menus_table::Migration),
            Box::new(m20240101_000003_create_menu_materials_table::Migration),
            Box::new(m20240101_000004_create_orders_table::Migration),
            Box::new(m20240101_000005_create_order_items_table::Migration),
        ]
    }
}

mod m20240101_000001_create_materials_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_materials_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Materials::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Materials::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Materials::Name).string().not_null())
                        .col(ColumnDef::new(Materials::Unit).string().not_null())
                        // Stock amounts are integer thousandths of the material's unit.
                        .col(
                            ColumnDef::new(Materials::Stock)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Materials::MinStock)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Materials::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Materials::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_materials_created_at")
                        .table(Materials::Table)
                        .col(Materials::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Materials::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Materials {
        Table,
        Id,
        Name,
        Unit,
        Stock,
        MinStock,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_menus_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_menus_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Menus::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Menus::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Menus::Name).string().not_null())
                        .col(ColumnDef::new(Menus::Description).text().null())
                        .col(ColumnDef::new(Menus::Price).decimal_len(14, 2).not_null())
                        .col(
                            ColumnDef::new(Menus::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Menus::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Menus::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Menus::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Menus {
        Table,
        Id,
        Name,
        Description,
        Price,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_menu_materials_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_menu_materials_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MenuMaterials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MenuMaterials::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MenuMaterials::MenuId).uuid().not_null())
                        .col(ColumnDef::new(MenuMaterials::MaterialId).uuid().not_null())
                        .col(
                            ColumnDef::new(MenuMaterials::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_menu_materials_menu_id")
                                .from(MenuMaterials::Table, MenuMaterials::MenuId)
                                .to(Menus::Table, Menus::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_menu_materials_material_id")
                                .from(MenuMaterials::Table, MenuMaterials::MaterialId)
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_menu_materials_menu_material")
                        .table(MenuMaterials::Table)
                        .col(MenuMaterials::MenuId)
                        .col(MenuMaterials::MaterialId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_menu_materials_material_id")
                        .table(MenuMaterials::Table)
                        .col(MenuMaterials::MaterialId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MenuMaterials::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MenuMaterials {
        Table,
        Id,
        MenuId,
        MaterialId,
        Quantity,
    }

    #[derive(DeriveIden)]
    enum Menus {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Materials {
        Table,
        Id,
    }
}

mod m20240101_000004_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNo).string_len(64).not_null())
                        .col(ColumnDef::new(Orders::CustomerName).string().null())
                        .col(
                            ColumnDef::new(Orders::TotalPrice)
                                .decimal_len(14, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::OrderType).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::CreatedBy).uuid().null())
                        .col(ColumnDef::new(Orders::CreatedByName).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_no")
                        .table(Orders::Table)
                        .col(Orders::OrderNo)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNo,
        CustomerName,
        TotalPrice,
        Status,
        OrderType,
        CreatedBy,
        CreatedByName,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_order_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::MenuId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Price)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::Subtotal)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_menu_id")
                                .from(OrderItems::Table, OrderItems::MenuId)
                                .to(Menus::Table, Menus::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_menu_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::MenuId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        MenuId,
        Quantity,
        Price,
        Subtotal,
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Menus {
        Table,
        Id,
    }
}
