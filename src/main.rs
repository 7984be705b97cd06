use std::error::Error;
use std::time::Duration;

use actix_web::{App, HttpServer};
use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::Request;

use certring::threads::check_predecessor::check_predecessor_periodically;
use certring::threads::chord::chord_proto::chord_server::ChordServer;
use certring::threads::chord::chord_proto::{self, Empty};
use certring::threads::chord::{connect, ChordService};
use certring::threads::setup::setup;
use certring::threads::web::{info as info_endpoint, retrieve, upload, WebState};
use certring::utils::cli::Cli;
use certring::utils::config::Config;
use certring::utils::constants::CONNECTION_RETRY_SLEEP_MILLIS;
use certring::utils::crypto::hash;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    simple_logger::SimpleLogger::new()
        .env()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    let config = Config::load(args.config.as_deref())?;

    let grpc_address = args.grpc.clone();
    let web_address = args.web.clone();
    let peer_address_option = args.peer.clone();
    let dev_mode = args.dev;

    let (tx_grpc, rx_grpc) = oneshot::channel();
    let (tx_check_predecessor, rx_check_predecessor) = oneshot::channel();
    let (tx_web, rx_web) = oneshot::channel();

    let mut thread_handles = Vec::new();

    info!("Starting up setup task");
    let setup_config = config.clone();
    let setup_grpc_address = grpc_address.clone();
    thread_handles.push(tokio::spawn(async move {
        setup(
            peer_address_option,
            &setup_grpc_address,
            &setup_config,
            tx_grpc,
            tx_check_predecessor,
            tx_web,
        )
        .await
        .expect("node setup failed");
    }));

    let grpc_config = config.clone();
    let grpc_bind_address = grpc_address.clone();
    thread_handles.push(tokio::spawn(async move {
        let chord_service = ChordServer::new(
            ChordService::new(rx_grpc, &grpc_bind_address, grpc_config, dev_mode).await,
        );
        info!("Starting up gRPC service on {}", grpc_bind_address);

        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(chord_proto::FILE_DESCRIPTOR_SET)
            .build()
            .expect("building the reflection service failed");

        let listener = TcpListener::bind(&grpc_bind_address)
            .await
            .expect("binding the gRPC address failed");
        Server::builder()
            .add_service(chord_service)
            .add_service(reflection_service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("gRPC service failed");
    }));

    info!("Starting up HTTP client API on {}", web_address);
    let web_config = config.clone();
    let web_grpc_address = grpc_address.clone();
    let web_bind_address = web_address.clone();
    std::thread::spawn(move || {
        actix_web::rt::System::new().block_on(async move {
            let (finger_table, predecessor_option, kv_store, successor_list) =
                rx_web.await.expect("setup task dropped its channel");
            let state = actix_web::web::Data::new(WebState {
                local_grpc_address: web_grpc_address.clone(),
                own_pos: hash(web_grpc_address.as_bytes()),
                config: web_config,
                finger_table,
                predecessor_option,
                kv_store,
                successor_list,
            });
            HttpServer::new(move || {
                App::new()
                    .app_data(state.clone())
                    .service(upload)
                    .service(retrieve)
                    .service(info_endpoint)
            })
            .bind(web_bind_address.as_str())
            .expect("binding the web address failed")
            .run()
            .await
            .expect("HTTP service failed");
        });
    });

    let check_config = config.clone();
    thread_handles.push(tokio::spawn(async move {
        check_predecessor_periodically(rx_check_predecessor, check_config)
            .await
            .expect("check-predecessor task failed");
    }));

    info!("Starting up periodic stabilize calls");
    let stabilize_interval = Duration::from_millis(config.stabilize_interval_ms);
    let stabilize_connect_timeout = config.connect_timeout();
    let stabilize_address = grpc_address.clone();
    thread_handles.push(tokio::spawn(async move {
        loop {
            match connect(&stabilize_address, stabilize_connect_timeout).await {
                Ok(mut client) => loop {
                    if let Err(e) = client.stabilize(Request::new(Empty {})).await {
                        warn!("Stabilize tick failed: {}", e);
                        break;
                    }
                    sleep(stabilize_interval).await;
                },
                Err(_) => {
                    debug!(
                        "Local gRPC service not reachable yet, retrying in {} millis",
                        CONNECTION_RETRY_SLEEP_MILLIS
                    );
                    sleep(Duration::from_millis(CONNECTION_RETRY_SLEEP_MILLIS)).await;
                }
            }
        }
    }));

    info!("Starting up periodic fix_fingers calls");
    let fix_fingers_interval = Duration::from_millis(config.fix_fingers_interval_ms);
    let fix_fingers_connect_timeout = config.connect_timeout();
    let fix_fingers_address = grpc_address.clone();
    thread_handles.push(tokio::spawn(async move {
        loop {
            match connect(&fix_fingers_address, fix_fingers_connect_timeout).await {
                Ok(mut client) => loop {
                    if let Err(e) = client.fix_fingers(Request::new(Empty {})).await {
                        warn!("Fix-fingers tick failed: {}", e);
                        break;
                    }
                    sleep(fix_fingers_interval).await;
                },
                Err(_) => {
                    debug!(
                        "Local gRPC service not reachable yet, retrying in {} millis",
                        CONNECTION_RETRY_SLEEP_MILLIS
                    );
                    sleep(Duration::from_millis(CONNECTION_RETRY_SLEEP_MILLIS)).await;
                }
            }
        }
    }));

    for handle in thread_handles {
        handle.await?;
    }

    Ok(())
}
