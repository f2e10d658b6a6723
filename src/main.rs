use anyhow::Result;
use axum::{Router, middleware, routing::get, routing::post};
use azlink::auth::{self, AppState};
use azlink::{AuthClient, AuthClientConfig, AuthMode};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "azlink")]
#[command(about = "azure ad / b2c sign-in and graph lookups behind an axum server")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "AZLINK_HOST", default_value = "localhost")]
    host: String,

    /// Port to bind to
    #[arg(short, long, env = "AZLINK_PORT", default_value = "8000")]
    port: u16,

    /// Application (client) id of the app registration
    #[arg(long, env = "AZURE_CLIENT_ID")]
    client_id: String,

    /// Client secret of the app registration
    #[arg(long, env = "AZURE_CLIENT_SECRET")]
    client_secret: String,

    /// Tenant id or name (e.g. contoso)
    #[arg(long, env = "AZURE_TENANT_ID")]
    tenant_id: String,

    /// Tenant for app-only graph access, if different from the sign-in tenant
    #[arg(long, env = "AZURE_OAUTH_TENANT_ID")]
    oauth_tenant_id: Option<String>,

    /// Explicit authority URL (overrides mode/tenant)
    #[arg(long, env = "AZURE_AUTHORITY")]
    authority: Option<String>,

    /// Sign-in flavour
    #[arg(short, long, value_enum, env = "AZURE_AUTH_MODE", default_value = "ad")]
    mode: AuthMode,

    /// B2C user flow, required in b2c mode (e.g. B2C_1_signin)
    #[arg(long, env = "AZURE_B2C_USER_FLOW")]
    b2c_user_flow: Option<String>,

    /// Where azure sends the browser back to. Defaults to http://HOST:PORT/callback
    #[arg(long, env = "AZURE_REDIRECT_URL")]
    redirect_url: Option<String>,

    /// Scopes to request, comma separated
    #[arg(long, env = "AZURE_SCOPES", value_delimiter = ',')]
    scopes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "azlink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let bind_addr = format!("{}:{}", args.host, args.port);
    let redirect_url = args
        .redirect_url
        .clone()
        .unwrap_or_else(|| format!("http://{}/callback", bind_addr));

    let auth_client = AuthClient::new(AuthClientConfig {
        client_id: args.client_id,
        client_secret: args.client_secret,
        tenant_id: args.tenant_id,
        oauth_tenant_id: args.oauth_tenant_id,
        authority: args.authority,
        b2c_user_flow: args.b2c_user_flow,
        redirect_url: Some(redirect_url.clone()),
        scopes: args.scopes,
        mode: args.mode,
    })?;

    tracing::info!("Mode: {}, authority: {}", args.mode, auth_client.authority());
    tracing::info!("Redirect URL: {}", redirect_url);
    tracing::warn!("Bearer tokens are NOT signature-checked; keep this behind a trusted proxy");

    let gate = auth_client.bearer_gate();
    let state = AppState {
        auth_client: Arc::new(auth_client),
    };

    // sign-in routes - no bearer needed (that's the whole point)
    let sign_in_routes = Router::new()
        .route("/login", get(auth::login_handler))
        .route("/callback", get(auth::callback_handler))
        .route("/token", post(auth::password_handler));

    let protected_routes = Router::new()
        .route("/me", get(auth::me_handler))
        .route("/me/photo", get(auth::me_photo_handler))
        .layer(middleware::from_fn_with_state(
            gate,
            auth::bearer_auth_middleware,
        ));

    let app = sign_in_routes.merge(protected_routes).with_state(state);

    // we pass this to TcpListener::bind() which accepts ToSocketAddrs,
    // so hostnames like "localhost" get resolved properly
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server ready at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
