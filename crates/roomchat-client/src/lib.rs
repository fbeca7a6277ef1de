pub mod config;
pub mod coordinator;
pub mod events;
pub mod profile;
pub mod replicator;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::NodeConfig;
pub use coordinator::{spawn_node, NodeCommand, NodeHandle};
pub use events::NodeNotification;
pub use replicator::{Broadcast, MessageReplicator, Received};
pub use state::NodeSnapshot;

/// Install the global `tracing` subscriber.  `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("roomchat_client=debug,roomchat_net=debug,roomchat_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
