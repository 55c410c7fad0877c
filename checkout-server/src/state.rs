//! Application state

use sqlx::PgPool;

use crate::config::Config;
use crate::fast_store::FastStore;
use crate::holds::HoldRegistry;
use crate::orders::OrderService;
use crate::payments::WebhookProcessor;
use crate::stock::StockLedger;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool (order ledger, idempotency log, products)
    pub pool: PgPool,
    /// Fast store (live reservations and stock counters)
    pub fast: FastStore,
    /// Stock ledger over the fast store
    pub ledger: StockLedger,
    /// Hold lifecycle registry
    pub holds: HoldRegistry,
    /// Order-from-hold service
    pub orders: OrderService,
    /// Idempotent webhook coordinator
    pub webhooks: WebhookProcessor,
    /// Server configuration
    pub config: Config,
}

impl AppState {
    /// Create a new AppState
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        // Connect to PostgreSQL
        let pool = PgPool::connect(&config.database_url).await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        // Connect to the fast store
        let fast = FastStore::connect(&config.redis_url).await?;

        let ledger = StockLedger::new(fast.clone(), pool.clone());
        let holds = HoldRegistry::new(
            fast.clone(),
            ledger.clone(),
            pool.clone(),
            config.hold_ttl_secs,
        );
        let orders = OrderService::new(fast.clone(), holds.clone(), pool.clone());
        let webhooks = WebhookProcessor::new(holds.clone(), pool.clone());

        Ok(Self {
            pool,
            fast,
            ledger,
            holds,
            orders,
            webhooks,
            config: config.clone(),
        })
    }
}
