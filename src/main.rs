use axum::Router;
use docqa_rag::{api, app_state::AppState, config, llm, session::Session};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env()?;
    info!(
        "Configuración: LLM {:?} en {}, embeddings {:?}, chunks de {} (+{}), top_k {}, solapamiento mínimo {}",
        cfg.llm_provider,
        cfg.completion.api_url,
        cfg.embedding_provider,
        cfg.chunker.chunk_size,
        cfg.chunker.chunk_overlap,
        cfg.retrieval.top_k,
        cfg.retrieval.min_overlap
    );

    // 3. Backend de completion y sesión (el índice se crea aquí, una sola vez)
    let completion = llm::from_config(&cfg)?;
    let session = Session::new(cfg.clone(), completion);
    let _ = session.index();

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 4. Estado compartido de la aplicación
    let app_state = AppState::new(cfg.clone(), session, Some(shutdown_tx));

    // 5. Router de la API y servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 6. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr).await?;
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
