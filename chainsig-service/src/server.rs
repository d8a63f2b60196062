use anyhow::Result;
use chainsig_core::{
    ChainSignatures, HttpRemoteSigner, JsonRpcClient, KeyDerivation, RemoteSigner,
};
use poem::{listener::TcpListener, Route, Server};
use poem_openapi::OpenApiService;
use std::sync::Arc;
use tokio::signal;

use crate::api::ChainSignaturesApi;
use crate::config::{ConfigFile, SignerKind};

fn build_signer(config: &ConfigFile) -> Result<Arc<dyn RemoteSigner>> {
    let signer: Arc<dyn RemoteSigner> = match config.signer.kind {
        SignerKind::Http => {
            let url = config
                .signer
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Signer kind 'http' requires url"))?;
            Arc::new(
                HttpRemoteSigner::new(url, config.signer.payload_order)
                    .with_gas(config.signer.gas.as_str(), config.signer.deposit.as_str()),
            )
        }
        SignerKind::Local => {
            tracing::warn!("Using local signer, root secret is held in process memory");
            Arc::new(config.signer.local_signer(config.derivation.scheme)?)
        }
    };
    Ok(signer)
}

pub async fn run(config: ConfigFile) -> Result<()> {
    let root = config.derivation.root()?;
    let chain_config = config.chain.chain_config()?;
    let signer = build_signer(&config)?;
    let rpc = Arc::new(JsonRpcClient::new(config.chain.rpc_url.as_str()));

    tracing::info!("Chain RPC: {}", rpc.url());
    tracing::info!(
        "Chain id {}, default call {}() on {}",
        chain_config.chain_id,
        chain_config.method,
        config.chain.target
    );

    let chainsig = ChainSignatures::new(
        KeyDerivation::new(root, config.derivation.scheme),
        chain_config,
        rpc.clone(),
        signer,
        rpc.clone(),
        config.signer.settings(),
    );

    let api = ChainSignaturesApi {
        chainsig: Arc::new(chainsig),
        rpc,
    };

    let api_service = OpenApiService::new(api, "Chain Signatures", "1.0");

    let ui = api_service.scalar();
    let spec = api_service.spec_endpoint();

    let app = Route::new()
        .nest("/", api_service)
        .nest("/docs", ui)
        .nest("/spec", spec);

    let server = &config.server;
    tracing::info!("Chain signatures service listening on {}:{}", server.host, server.port);
    tracing::info!("   GET  /api/address?controller_id=alice.testnet&path=ethereum-1");
    tracing::info!("   POST /api/execute {{\"controller_id\": \"...\", \"path\": \"...\"}}");
    tracing::info!("   Documentation: http://{}:{}/docs", server.host, server.port);

    Server::new(TcpListener::bind(format!("{}:{}", server.host, server.port)))
        .run_with_graceful_shutdown(app, shutdown_signal(), None)
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
