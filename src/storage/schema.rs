use sqlx::PgPool;

/// Create the ledger tables if they do not exist.
///
/// Statements are idempotent, so this is safe to run on every start.
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing ledger schema...");

    for statement in [
        CREATE_ORDERS_TABLE,
        CREATE_ORDERS_STATUS_INDEX,
        CREATE_BALANCES_TABLE,
        CREATE_WITHDRAWALS_TABLE,
        CREATE_WITHDRAWALS_USER_INDEX,
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Ledger schema ready");
    Ok(())
}

/// Orders. `status` holds `OrderStatus::id()`.
pub const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id          BIGSERIAL PRIMARY KEY,
    user_id     BIGINT      NOT NULL,
    number      TEXT        NOT NULL UNIQUE,
    status      SMALLINT    NOT NULL DEFAULT 0,
    accrual     BIGINT      NOT NULL DEFAULT 0 CHECK (accrual >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_ORDERS_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS orders_status_created_idx ON orders (status, created_at)";

/// One row per user
pub const CREATE_BALANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balances (
    user_id           BIGINT PRIMARY KEY,
    current_amount    BIGINT NOT NULL DEFAULT 0 CHECK (current_amount >= 0),
    withdrawn_amount  BIGINT NOT NULL DEFAULT 0 CHECK (withdrawn_amount >= 0)
)
"#;

pub const CREATE_WITHDRAWALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS withdrawals (
    id            BIGSERIAL PRIMARY KEY,
    user_id       BIGINT      NOT NULL,
    order_number  TEXT        NOT NULL,
    sum           BIGINT      NOT NULL CHECK (sum > 0),
    processed_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_WITHDRAWALS_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS withdrawals_user_idx ON withdrawals (user_id, processed_at)";
