//! pawsense-server: relay layer for PawSense
//!
//! HTTP dashboard and WebSocket push channel, the Telegram notification sink
//! and command bot, the alert dispatcher and the real-time monitor service.

pub mod bot;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod notifier;
pub mod static_files;
pub mod vision;
pub mod websocket;

pub use context::AppContext;
pub use dispatcher::{spawn_dispatcher, Delivery, DispatchHandle, DeliveryOutcome};
pub use error::{ApiError, MonitorError, NotifyError};
pub use http::create_router;
pub use metrics::ServiceMetrics;
pub use monitor::MonitorService;
pub use notifier::{ChatApi, Notifier, ParseMode, TelegramNotifier, VideoAttachment};
pub use vision::{VisionBackend, VisionModels};
pub use websocket::{DashboardEvent, DashboardHub};
