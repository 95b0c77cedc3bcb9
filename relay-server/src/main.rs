mod admin_rpc;
mod datagram_server;
mod stream_server;
mod voice_relay;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use server_core::config::Config;
use server_core::Services;
use tokio::net::{TcpListener, UdpSocket};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(worker_threads = 4)]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "rtype_server=info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = Config::from_env();
    let services = Services::new_in_memory(config);

    let tcp_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), services.config.tcp_port);
    let udp_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), services.config.udp_port);
    let voice_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), services.config.voice_port);
    let admin_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), services.config.admin_port);

    let stream_listener = match TcpListener::bind(tcp_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %tcp_addr, "failed to bind stream listener");
            std::process::exit(1);
        }
    };
    let datagram_socket = match UdpSocket::bind(udp_addr).await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::error!(%err, %udp_addr, "failed to bind datagram socket");
            std::process::exit(1);
        }
    };
    let voice_socket = match UdpSocket::bind(voice_addr).await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::error!(%err, %voice_addr, "failed to bind voice socket");
            std::process::exit(1);
        }
    };
    let admin_listener = match TcpListener::bind(admin_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %admin_addr, "failed to bind admin listener");
            std::process::exit(1);
        }
    };

    tracing::info!(%tcp_addr, %udp_addr, %voice_addr, %admin_addr, "rtype relay server starting");

    let stream_task = tokio::spawn(stream_server::run(stream_listener, services.clone()));
    let datagram_task = tokio::spawn(datagram_server::run(datagram_socket, services.clone()));
    let voice_task = tokio::spawn(voice_relay::run(voice_socket, services.clone()));
    let admin_task = tokio::spawn(admin_rpc::run(admin_listener, services.clone()));

    tokio::select! {
        _ = stream_task => tracing::error!("stream server task exited"),
        _ = datagram_task => tracing::error!("datagram server task exited"),
        _ = voice_task => tracing::error!("voice relay task exited"),
        _ = admin_task => tracing::error!("admin rpc task exited"),
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
    }
}
