use tracing_subscriber::{filter::Directive, EnvFilter};

pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "d0010_ingest=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
