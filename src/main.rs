use std::env;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use kafka_producer::kafka::Record;
use kafka_producer::{Producer, ProducerProperties};

const USAGE: &str = "usage: kafka-producer <producer.properties> <topic> <partition> <value> [key]";

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kafka_producer=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = env::args().skip(1);

    let properties = args.next().map(PathBuf::from).context(USAGE)?;
    let topic = args.next().context(USAGE)?;
    let partition = args
        .next()
        .context(USAGE)?
        .parse::<i32>()
        .context("partition must be an INT32")?;
    let value = args.next().context(USAGE)?;
    let key = args.next();

    let props = ProducerProperties::load(&properties)
        .await
        .with_context(|| format!("parse {properties:?}"))?;

    info!(?props, "loaded producer properties");

    let mut record = Record::builder().value(value);
    if let Some(key) = key {
        record = record.key(key);
    }
    let record = record.build().context("build record")?;

    let produce = async {
        let mut producer = Producer::connect(&props)
            .await
            .with_context(|| format!("connect to {}", props.bootstrap_server))?;

        producer
            .produce(&topic, partition, [record])
            .await
            .with_context(|| format!("produce to {topic}-{partition}"))
    };

    tokio::select! {
        res = produce => {
            let correlation_id = res?;
            info!(correlation_id, %topic, partition, "record produced");
            Ok(())
        },

        // handle signals
        sig = signal::ctrl_c() => match sig {
            Ok(()) => {
                info!("received SIGINT, aborting");
                Ok(())
            },
            Err(e) => {
                error!(error = %e, "terminating after error");
                Err(e).context("failed while receiving an interrupt signal")
            },
        }
    }
}
