use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    Row, Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};

use crate::{
    CartItem, CartLine, MessageHandle, Money, NewOrder, Order, OrderId, OrderLine, OrderStatus,
    Product, ProductDraft, ProductId, Result, SessionRecord, StoreError, UserId,
    store::{ShopStore, cart_matches, validate_new_order},
};

const PRODUCT_COLUMNS: &str = "id, name, description, price, discount_price, stock, image";
const ORDER_COLUMNS: &str = "id, user_id, contact, total, status, created_at, notification_handle";

/// Default bound on a single store transaction.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed shop store.
///
/// Every mutating operation runs in a transaction whose first statement is a
/// write, so SQLite hands out the write lock before anything is read and
/// concurrent writers queue on `busy_timeout` instead of deadlocking.
#[derive(Clone)]
pub struct SqliteShopStore {
    pool: SqlitePool,
    tx_timeout: Duration,
}

impl SqliteShopStore {
    /// Creates a new SQLite shop store.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            tx_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }

    /// Sets the bound after which a transaction is abandoned and rolled back.
    pub fn with_timeout(mut self, tx_timeout: Duration) -> Self {
        self.tx_timeout = tx_timeout;
        self
    }

    /// Opens (creating if needed) the database file at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(DEFAULT_TRANSACTION_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// Opens a private in-memory database on a single long-lived connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Runs `operation` under the transaction timeout.
    ///
    /// A timed-out operation is dropped, which rolls its transaction back.
    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let result = match tokio::time::timeout(self.tx_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.tx_timeout)),
        };

        if let Err(ref e) = result
            && matches!(e, StoreError::Busy | StoreError::Timeout(_))
        {
            tracing::warn!(error = %e, "Store transaction did not complete");
            metrics::counter!("store_contention_total").increment(1);
        }
        result
    }

    /// Begins a transaction that holds the write lock from its first statement.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        let mut tx = self.pool.begin().await?;
        // Never matches a row (quantity is checked > 0); only takes the lock.
        sqlx::query("DELETE FROM cart_items WHERE quantity <= 0")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    fn row_to_product(row: &SqliteRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::from_minor(row.try_get("price")?),
            discount_price: row
                .try_get::<Option<i64>, _>("discount_price")?
                .map(Money::from_minor),
            stock: to_u32(row.try_get("stock")?, "stock")?,
            image: row.try_get("image")?,
        })
    }

    fn row_to_order(row: &SqliteRow, lines: Vec<OrderLine>) -> Result<Order> {
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            contact: row.try_get("contact")?,
            lines,
            total: Money::from_minor(row.try_get("total")?),
            status: status
                .parse()
                .map_err(|e| StoreError::InvalidRecord(format!("{e}")))?,
            created_at: row.try_get("created_at")?,
            notification_handle: row
                .try_get::<Option<i64>, _>("notification_handle")?
                .map(MessageHandle::new),
        })
    }

    async fn fetch_product(conn: &mut SqliteConnection, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(conn)
            .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    /// Reads the user's cart joined with live product data.
    async fn fetch_cart_items(
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.description, p.price, p.discount_price, p.stock, p.image,
                   c.quantity AS cart_quantity
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = ?
            ORDER BY c.id ASC
            "#,
        )
        .bind(user_id.get())
        .fetch_all(conn)
        .await?;

        rows.iter()
            .map(|row| {
                let product = Self::row_to_product(row)?;
                let quantity = to_u32(row.try_get("cart_quantity")?, "quantity")?;
                Ok(CartItem::new(&product, quantity))
            })
            .collect()
    }

    async fn fetch_stock(conn: &mut SqliteConnection, id: ProductId) -> Result<Option<u32>> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?")
            .bind(id.get())
            .fetch_optional(conn)
            .await?;

        stock.map(|s| to_u32(s, "stock")).transpose()
    }

    async fn fetch_cart_quantity(
        conn: &mut SqliteConnection,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<u32> {
        let quantity: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM cart_items WHERE user_id = ? AND product_id = ?",
        )
        .bind(user_id.get())
        .bind(product_id.get())
        .fetch_optional(conn)
        .await?;

        quantity.map_or(Ok(0), |q| to_u32(q, "quantity"))
    }

    async fn upsert_cart_line(conn: &mut SqliteConnection, line: CartLine) -> Result<()> {
        // The conflict branch keeps the row id, so the line keeps its position.
        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = excluded.quantity
            "#,
        )
        .bind(line.user_id.get())
        .bind(line.product_id.get())
        .bind(i64::from(line.quantity))
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn fetch_order_lines(conn: &mut SqliteConnection, id: OrderId) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, quantity, unit_price
            FROM order_items
            WHERE order_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(id.get())
        .fetch_all(conn)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(OrderLine {
                    product_id: ProductId::new(row.try_get("product_id")?),
                    product_name: row.try_get("product_name")?,
                    quantity: to_u32(row.try_get("quantity")?, "quantity")?,
                    unit_price: Money::from_minor(row.try_get("unit_price")?),
                })
            })
            .collect()
    }

    async fn fetch_order(conn: &mut SqliteConnection, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => {
                let lines = Self::fetch_order_lines(conn, id).await?;
                Self::row_to_order(&row, lines).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn rows_to_orders(&self, rows: Vec<SqliteRow>) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let id = OrderId::new(row.try_get("id")?);
            let lines = Self::fetch_order_lines(&mut conn, id).await?;
            orders.push(Self::row_to_order(&row, lines)?);
        }
        Ok(orders)
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRecord(format!("{column} out of range: {value}")))
}

#[async_trait]
impl ShopStore for SqliteShopStore {
    async fn upsert_product(&self, draft: ProductDraft) -> Result<Product> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            let id = match draft.id {
                Some(id) => {
                    let updated = sqlx::query(
                        r#"
                        UPDATE products
                        SET name = ?, description = ?, price = ?, discount_price = ?, stock = ?, image = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&draft.name)
                    .bind(&draft.description)
                    .bind(draft.price.minor())
                    .bind(draft.discount_price.map(|d| d.minor()))
                    .bind(i64::from(draft.stock))
                    .bind(&draft.image)
                    .bind(id.get())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

                    if updated == 0 {
                        return Err(StoreError::ProductNotFound(id));
                    }
                    id
                }
                None => {
                    let id: i64 = sqlx::query_scalar(
                        r#"
                        INSERT INTO products (name, description, price, discount_price, stock, image)
                        VALUES (?, ?, ?, ?, ?, ?)
                        RETURNING id
                        "#,
                    )
                    .bind(&draft.name)
                    .bind(&draft.description)
                    .bind(draft.price.minor())
                    .bind(draft.discount_price.map(|d| d.minor()))
                    .bind(i64::from(draft.stock))
                    .bind(&draft.image)
                    .fetch_one(&mut *tx)
                    .await?;
                    ProductId::new(id)
                }
            };

            tx.commit().await?;
            Ok(draft.into_product(id))
        })
        .await
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        self.bounded(async {
            let mut tx = self.begin_write().await?;

            sqlx::query("DELETE FROM cart_items WHERE product_id = ?")
                .bind(id.get())
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM favorites WHERE product_id = ?")
                .bind(id.get())
                .execute(&mut *tx)
                .await?;
            let deleted = sqlx::query("DELETE FROM products WHERE id = ?")
                .bind(id.get())
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if deleted == 0 {
                return Err(StoreError::ProductNotFound(id));
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_product(&mut conn, id).await
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product> {
        self.bounded(async {
            let mut tx = self.begin_write().await?;

            let updated = sqlx::query("UPDATE products SET stock = stock + ? WHERE id = ? AND stock + ? >= 0")
                .bind(delta)
                .bind(id.get())
                .bind(delta)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if updated == 0 {
                return match Self::fetch_stock(&mut tx, id).await? {
                    Some(available) => Err(StoreError::InsufficientStock {
                        product_id: id,
                        requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                        available,
                    }),
                    None => Err(StoreError::ProductNotFound(id)),
                };
            }

            let product = Self::fetch_product(&mut tx, id)
                .await?
                .ok_or(StoreError::ProductNotFound(id))?;
            tx.commit().await?;
            Ok(product)
        })
        .await
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        self.bounded(async {
            let mut tx = self.begin_write().await?;

            let available = Self::fetch_stock(&mut tx, product_id)
                .await?
                .ok_or(StoreError::ProductNotFound(product_id))?;
            let requested = Self::fetch_cart_quantity(&mut tx, user_id, product_id)
                .await?
                .saturating_add(quantity);

            if requested > available {
                return Err(StoreError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                });
            }

            let line = CartLine {
                user_id,
                product_id,
                quantity: requested,
            };
            Self::upsert_cart_line(&mut tx, line).await?;
            tx.commit().await?;
            Ok(line)
        })
        .await
    }

    async fn set_cart_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        self.bounded(async {
            let mut tx = self.begin_write().await?;

            let available = Self::fetch_stock(&mut tx, product_id)
                .await?
                .ok_or(StoreError::ProductNotFound(product_id))?;

            if quantity > available {
                return Err(StoreError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                });
            }

            let line = CartLine {
                user_id,
                product_id,
                quantity,
            };
            Self::upsert_cart_line(&mut tx, line).await?;
            tx.commit().await?;
            Ok(line)
        })
        .await
    }

    async fn remove_from_cart(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM cart_items WHERE user_id = ? AND product_id = ?")
            .bind(user_id.get())
            .bind(product_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed > 0)
    }

    async fn cart_items(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_cart_items(&mut conn, user_id).await
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed)
    }

    async fn commit_order(&self, order: NewOrder) -> Result<Order> {
        validate_new_order(&order)?;

        self.bounded(async {
            let mut tx = self.begin_write().await?;

            // Re-read the cart under the write lock so a product renamed or
            // repriced after the order was built shows up as a stale cart.
            let live: Vec<OrderLine> = Self::fetch_cart_items(&mut tx, order.user_id)
                .await?
                .iter()
                .map(OrderLine::from)
                .collect();

            if !cart_matches(&order, &live) {
                return Err(StoreError::StaleCart(order.user_id));
            }

            for line in &order.lines {
                let updated =
                    sqlx::query("UPDATE products SET stock = stock - ? WHERE id = ? AND stock >= ?")
                        .bind(i64::from(line.quantity))
                        .bind(line.product_id.get())
                        .bind(i64::from(line.quantity))
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();

                if updated == 0 {
                    // Dropping the transaction rolls back the lines already taken.
                    return match Self::fetch_stock(&mut tx, line.product_id).await? {
                        Some(available) => Err(StoreError::InsufficientStock {
                            product_id: line.product_id,
                            requested: line.quantity,
                            available,
                        }),
                        None => Err(StoreError::ProductNotFound(line.product_id)),
                    };
                }
            }

            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO orders (user_id, contact, total, status, created_at)
                VALUES (?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(order.user_id.get())
            .bind(&order.contact)
            .bind(order.total.minor())
            .bind(OrderStatus::Pending.as_str())
            .bind(order.created_at)
            .fetch_one(&mut *tx)
            .await?;
            let id = OrderId::new(id);

            for (position, line) in order.lines.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO order_items (order_id, position, product_id, product_name, quantity, unit_price)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(id.get())
                .bind(position as i64)
                .bind(line.product_id.get())
                .bind(&line.product_name)
                .bind(i64::from(line.quantity))
                .bind(line.unit_price.minor())
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
                .bind(order.user_id.get())
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            tracing::debug!(order_id = %id, user_id = %order.user_id, "Order committed");
            Ok(order.clone().into_order(id))
        })
        .await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_order(&mut conn, id).await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? ORDER BY id DESC"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        self.rows_to_orders(rows).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ? ORDER BY id DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id DESC"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        self.rows_to_orders(rows).await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<Order> {
        self.bounded(async {
            let mut tx = self.begin_write().await?;

            let updated = sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ?")
                .bind(status.as_str())
                .bind(id.get())
                .bind(expected.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if updated == 0 {
                let actual: Option<String> =
                    sqlx::query_scalar("SELECT status FROM orders WHERE id = ?")
                        .bind(id.get())
                        .fetch_optional(&mut *tx)
                        .await?;

                return match actual {
                    Some(actual) => Err(StoreError::StatusConflict {
                        order_id: id,
                        expected,
                        actual: actual
                            .parse()
                            .map_err(|e| StoreError::InvalidRecord(format!("{e}")))?,
                    }),
                    None => Err(StoreError::OrderNotFound(id)),
                };
            }

            let order = Self::fetch_order(&mut tx, id)
                .await?
                .ok_or(StoreError::OrderNotFound(id))?;
            tx.commit().await?;
            Ok(order)
        })
        .await
    }

    async fn set_notification_handle(&self, id: OrderId, handle: MessageHandle) -> Result<()> {
        let updated = sqlx::query("UPDATE orders SET notification_handle = ? WHERE id = ?")
            .bind(handle.get())
            .bind(id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::OrderNotFound(id));
        }
        Ok(())
    }

    async fn add_favorite(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        self.bounded(async {
            let mut tx = self.begin_write().await?;

            if Self::fetch_stock(&mut tx, product_id).await?.is_none() {
                return Err(StoreError::ProductNotFound(product_id));
            }

            let inserted = sqlx::query(
                "INSERT INTO favorites (user_id, product_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(user_id.get())
            .bind(product_id.get())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            tx.commit().await?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn remove_favorite(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND product_id = ?")
            .bind(user_id.get())
            .bind(product_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed > 0)
    }

    async fn favorites(&self, user_id: UserId) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.description, p.price, p.discount_price, p.stock, p.image
            FROM favorites f
            JOIN products p ON p.id = f.product_id
            WHERE f.user_id = ?
            ORDER BY f.id ASC
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn load_session(&self, user_id: UserId) -> Result<Option<SessionRecord>> {
        let row = sqlx::query("SELECT state, updated_at FROM sessions WHERE user_id = ?")
            .bind(user_id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let state: String = row.try_get("state")?;
                Ok(Some(SessionRecord {
                    state: serde_json::from_str(&state)?,
                    updated_at: row.try_get("updated_at")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_session(&self, user_id: UserId, session: SessionRecord) -> Result<()> {
        let state = serde_json::to_string(&session.state)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (user_id, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id.get())
        .bind(state)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_session(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
