// Copyright (c) 2026 contributors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dashmap::DashMap;
use tracing::{info, warn};

use streamcore::bus::EventBus;
use streamcore::common::types::AnyResult;
use streamcore::configs::Config;
use streamcore::dacp::{self, DacpServer};
use streamcore::group::GroupCoordinator;
use streamcore::http_stream;
use streamcore::loudness::{LoudnessAnalyser, NoopLoudnessStore};
use streamcore::model::{PlayerEndpoint, PlayerState};
use streamcore::queue::Queue;
use streamcore::queue::memory::InMemoryQueue;
use streamcore::server::AppState;

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;

    streamcore::common::logger::init(&config);
    streamcore::common::banner::print_banner(&streamcore::common::banner::BannerInfo::default());

    info!("audio streaming core starting...");

    let players = Arc::new(DashMap::new());
    for endpoint in &config.endpoints {
        let mut entry = PlayerEndpoint::new(endpoint.player_id.clone(), endpoint.address.clone());
        entry.state = PlayerState::Idle;
        if let Some(md) = &endpoint.md {
            entry.discovery_props.insert("md".to_string(), md.clone());
        }
        if let Some(et) = &endpoint.et {
            entry.discovery_props.insert("et".to_string(), et.clone());
        }
        players.insert(endpoint.player_id.clone(), entry);
    }

    let remote_sessions = Arc::new(DashMap::new());
    let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Vec::new()));
    let bus = EventBus::new();
    let loudness = Arc::new(LoudnessAnalyser::new(Arc::new(NoopLoudnessStore)));
    let dacp_id = dacp::generate_dacp_id();

    let group = Arc::new(
        GroupCoordinator::new(
            players.clone(),
            remote_sessions.clone(),
            queue.clone(),
            bus.clone(),
            loudness.clone(),
            config.clone(),
            dacp_id.clone(),
        )
        .await,
    );

    let dacp_server = Arc::new(DacpServer::new(
        players.clone(),
        remote_sessions,
        group,
        queue.clone(),
        bus.clone(),
        dacp_id,
    ));

    match DacpServer::bind(&config.server.host, config.server.dacp_port_range).await {
        Ok((listener, port)) => {
            info!(port, "DACP control server listening");
            let advertise_ip: std::net::IpAddr = config
                .server
                .host
                .parse()
                .unwrap_or_else(|_| std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
            if advertise_ip.is_unspecified() {
                warn!("server.host is unspecified, skipping DACP mDNS advertisement");
            } else {
                match dacp::mdns::DacpAdvertiser::new(advertise_ip, port, dacp_server.dacp_id()) {
                    Ok(advertiser) => {
                        // Kept alive for the process lifetime; unregistering on
                        // shutdown isn't modeled since nothing currently
                        // initiates a graceful stop.
                        std::mem::forget(advertiser);
                    }
                    Err(e) => warn!(error = %e, "failed to advertise DACP service via mDNS"),
                }
            }
            let server_for_task = dacp_server.clone();
            tokio::spawn(async move {
                server_for_task.run(listener).await;
            });
        }
        Err(e) => warn!(error = %e, "failed to bind DACP control server, continuing without it"),
    }

    let shared_state = Arc::new(AppState {
        start_time: std::time::Instant::now(),
        players,
        queue,
        bus,
        loudness,
        config: config.clone(),
    });

    let app: Router = http_stream::router()
        .with_state(shared_state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let ip: std::net::IpAddr = config.server.host.parse()?;
    let address = SocketAddr::from((ip, config.server.port));
    info!("streaming HTTP endpoint listening on {}", address);

    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
