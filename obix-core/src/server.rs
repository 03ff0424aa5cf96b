//! Top-level server: wires the object tree, device/watch/history
//! subsystems, and dispatcher together, and drives the periodic device
//! backup task (spec §6.3 `backup_period`).

use std::sync::{Arc, Weak};

use obix_model::node::Node;
use obix_model::Result;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::device::{DefaultOracle, DeviceRegistry};
use crate::dispatcher::{Dispatcher, Request};
use crate::history::HistoryRegistry;
use crate::sync::ptask::Scheduler;
use crate::tree::ObjectTree;
use crate::watch::WatchRegistry;

pub struct Server {
    pub config: CoreConfig,
    pub tree: Arc<ObjectTree>,
    pub devices: Arc<DeviceRegistry>,
    pub watches: Arc<WatchRegistry>,
    pub histories: Arc<HistoryRegistry>,
    pub dispatcher: Dispatcher,
    scheduler: Arc<Scheduler>,
}

impl Server {
    /// Builds every subsystem, loads the bootstrap tree from
    /// `config.res_dir` if configured, and starts the backup scheduler.
    pub fn start(config: CoreConfig) -> Result<Arc<Self>> {
        let tree = Arc::new(ObjectTree::new());
        if let (Some(core_dir), Some(sys_dir)) = (config.core_dir(), config.sys_dir()) {
            tree.load_bootstrap(&core_dir, &sys_dir)?;
        }

        let devices = Arc::new(DeviceRegistry::with_capacity(
            Box::new(DefaultOracle),
            config.dev_table_size,
            config.dev_cache_size,
        ));
        let scheduler = Arc::new(Scheduler::new());
        let watches = WatchRegistry::new(scheduler.clone());
        let histories = Arc::new(HistoryRegistry::new(config.res_dir.clone()));
        let dispatcher = Dispatcher::new(tree.clone(), devices.clone(), watches.clone(), histories.clone());

        let server = Arc::new(Self {
            config,
            tree,
            devices,
            watches,
            histories,
            dispatcher,
        });
        Self::schedule_backup(&server);
        info!("core server started");
        Ok(server)
    }

    fn schedule_backup(self_ref: &Arc<Self>) {
        let period = self_ref.config.backup_period;
        if period.is_zero() {
            return;
        }
        let weak_self: Weak<Self> = Arc::downgrade(self_ref);
        self_ref.scheduler.schedule(period, None, move || {
            let Some(server) = weak_self.upgrade() else {
                return;
            };
            server.backup_due_devices();
        });
    }

    fn backup_due_devices(&self) {
        for href in self.devices.all_hrefs() {
            let Some(device) = self.devices.get(&href) else {
                continue;
            };
            if device.due_for_backup(self.config.backup_period) {
                if let Err(err) = self.devices.persist(&device) {
                    warn!(href = %href, error = %err, "device backup failed");
                }
            }
        }
    }

    pub fn handle(&self, req: Request) -> Node {
        self.dispatcher.handle(req)
    }

    /// Stops the backup scheduler. The device and watch gates are dropped
    /// with the registries themselves; nothing holds a reader/writer permit
    /// indefinitely once in-flight requests finish draining.
    pub fn shutdown(&self) {
        self.scheduler.dispose();
        info!("core server shut down");
    }
}
