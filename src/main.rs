use clap::Parser;
use partyline::cli::{resolve_room, Args};
use partyline::{client, web};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    // Coordinator mode
    if args.serve {
        web::serve(args.port).await?;
        return Ok(());
    }

    // Client mode
    let room = resolve_room(args.room.as_deref())?;
    client::run(&args.url, &room, args.name).await?;

    Ok(())
}
