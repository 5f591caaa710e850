use csv_io::csv_processor::{drain_lines, drain_records};
use csv_io::{
    describe_input, AppConfig, ExportPipeline, ExportSchema, ImportPipeline, ImportSchema,
    InputSource, SchemaFile, TextStreamWriter,
};
use std::env;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SAMPLE_SIZE: usize = 1024 * 1024;

const USAGE: &str = "usage: csv-io <import|export|describe> <schema.toml> <input>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(Some("config.toml"));
    init_tracing(&config)?;

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    let schema_file = SchemaFile::load_from_file(&args[2])?;
    let input = args[3].as_str();

    match args[1].as_str() {
        "import" => run_import(&config, &schema_file, input).await?,
        "export" => run_export(&config, &schema_file, input).await?,
        "describe" => run_describe(&config, &schema_file, input).await?,
        other => anyhow::bail!("unknown command {:?}\n{}", other, USAGE),
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("csv_io={}", config.logging.level).parse()?);

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

async fn run_import(config: &AppConfig, schema_file: &SchemaFile, input: &str) -> anyhow::Result<()> {
    let schema: ImportSchema = schema_file.to_schema(&config.pipeline);
    let mut pipeline = ImportPipeline::new(schema)?;

    let subscriber = pipeline.subscribe().await;
    let drain = tokio::spawn(async move {
        let mut writer = TextStreamWriter::new(tokio::io::stdout());
        drain_records(subscriber, &mut writer).await
    });

    let source = InputSource::new(input);
    pipeline.attach_reader(source.open().await?)?;

    let completion = pipeline.end().await;
    let written = drain.await??;

    match completion {
        Ok(done) => {
            tracing::info!(
                "Imported {} of {} records from {}",
                written,
                done.rows_delivered,
                source.path()
            );
            Ok(())
        }
        Err(e) => {
            if let Some(signal) = e.signal() {
                eprintln!("{}", serde_json::to_string(signal)?);
            }
            Err(e.into())
        }
    }
}

async fn run_export(config: &AppConfig, schema_file: &SchemaFile, input: &str) -> anyhow::Result<()> {
    let schema: ExportSchema = schema_file.to_schema(&config.pipeline);
    let mut pipeline = ExportPipeline::new(schema)?;

    let subscriber = pipeline.subscribe().await;
    let drain = tokio::spawn(async move {
        let mut writer = TextStreamWriter::new(tokio::io::stdout());
        drain_lines(subscriber, &mut writer).await
    });

    let (tx, rx) = mpsc::channel(config.pipeline.relay_capacity.max(1));
    pipeline.attach_source(rx)?;

    let source = InputSource::new(input);
    let read = source.stream_records(tx).await?;

    let done = pipeline.end().await?;
    let written = drain.await??;

    tracing::info!(
        "Exported {} records from {} as {} lines, {} formatting faults",
        read,
        source.path(),
        written,
        done.formatting_faults
    );
    Ok(())
}

async fn run_describe(config: &AppConfig, schema_file: &SchemaFile, input: &str) -> anyhow::Result<()> {
    let schema: ImportSchema = schema_file.to_schema(&config.pipeline);
    let table = schema.resolve()?;

    let sample = InputSource::new(input).read_sample(SAMPLE_SIZE).await?;
    let description = describe_input(&sample, &table.names(), table.config())?;

    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}
