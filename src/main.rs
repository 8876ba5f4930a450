use docshelf::{
    api, config,
    documents::DocumentService,
    embedding::OllamaEmbedder,
    extraction::ExtractionClient,
    logging,
    qdrant::QdrantIndex,
    storage::{FsBlobStore, RecordStore},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let records = RecordStore::open(&config.database_path).expect("Failed to open record store");
    let blobs = Arc::new(FsBlobStore::new(
        &config.blob_root,
        &config.blob_base_url,
        &config.blob_signing_key,
        config.presign_expiry_secs,
    ));
    let index = QdrantIndex::new(&config.qdrant_url, config.qdrant_api_key.clone())
        .expect("Failed to build Qdrant client");
    index
        .ensure_collection(
            &config.qdrant_collection_name,
            config.embedding_dimension as u64,
        )
        .await
        .expect("Failed to ensure Qdrant collection");
    let embedder = Arc::new(
        OllamaEmbedder::new(
            &config.ollama_url,
            &config.embedding_model,
            config.embedding_dimension,
        )
        .expect("Failed to build embedding client"),
    );
    let extractor = ExtractionClient::new(
        &config.extractor_url,
        Duration::from_secs(config.extractor_timeout_secs),
    )
    .expect("Failed to build extraction client");

    let service = DocumentService::new(records, blobs, index, embedder, extractor);
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8080..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8080-8099",
    ))
}
