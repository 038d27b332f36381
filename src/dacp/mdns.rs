//! mDNS advertisement for the DACP control server, spec §4.7: service type
//! `_dacp._tcp.local.`, name `iTunes_Ctrl_<dacp_id>`, properties
//! `{txtvers, Ver, DbId, OSsi}`. Grounded on the pack's own LAN-discovery
//! advertiser (`thaumic-core::mdns_advertise`) — best-effort, logged not
//! fatal on failure.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

const SERVICE_TYPE: &str = "_dacp._tcp.local.";

pub struct DacpAdvertiser {
    daemon: ServiceDaemon,
    service_fullname: String,
    shutdown_called: AtomicBool,
}

impl DacpAdvertiser {
    pub fn new(advertise_ip: IpAddr, port: u16, dacp_id: &str) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;

        let instance_name = format!("iTunes_Ctrl_{dacp_id}");
        let host = format!("{}.local.", instance_name.to_lowercase());

        let mut txt = HashMap::new();
        txt.insert("txtvers".to_string(), "1".to_string());
        txt.insert("Ver".to_string(), "131077".to_string());
        txt.insert("DbId".to_string(), dacp_id.to_string());
        txt.insert("OSsi".to_string(), "0x1F6".to_string());

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &instance_name,
            &host,
            advertise_ip,
            port,
            Some(txt),
        )?;

        let fullname = service.get_fullname().to_string();
        daemon.register(service)?;

        info!(instance_name = %instance_name, port, "advertising DACP service via mDNS");

        Ok(Self {
            daemon,
            service_fullname: fullname,
            shutdown_called: AtomicBool::new(false),
        })
    }

    pub fn shutdown(&self) {
        if self.shutdown_called.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.daemon.unregister(&self.service_fullname) {
            warn!(error = %e, "failed to unregister DACP mDNS service");
        }
    }
}

impl Drop for DacpAdvertiser {
    fn drop(&mut self) {
        self.shutdown();
    }
}
