//! Демонстрация маршрутизатора каналов
//!
//! Поднимает внутрипроцессный транспорт, подписывается на указанные
//! каналы и шаблоны, публикует сообщения и печатает каждую доставку
//! в виде `канал<TAB>нагрузка`.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use chanroute::{
    init_logging, ChannelListener, ChannelRouter, MemoryTransport, Payload, Settings,
    TokioScheduler,
};
use clap::Parser;
use tokio::{sync::mpsc, time::timeout};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chanroute")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Glob-pattern channel router demo over an in-process transport", long_about = None)]
struct Cli {
    /// Точные каналы для подписки
    #[arg(short, long = "channel")]
    channels: Vec<String>,
    /// Glob-шаблоны для подписки
    #[arg(short, long = "pattern")]
    patterns: Vec<String>,
    /// Сообщения в виде КАНАЛ=НАГРУЗКА
    #[arg(long = "publish", value_parser = parse_publish)]
    publish: Vec<(String, String)>,
    /// Разбирать строковые сообщения как JSON
    #[arg(long)]
    json: bool,
    /// Файл настроек
    #[arg(long, env = "CHANROUTE_CONFIG")]
    config: Option<String>,
    /// Сколько ждать новых доставок перед выходом, мс
    #[arg(long, default_value = "200")]
    linger_ms: u64,
    /// Включить подробный вывод (debug)
    #[arg(short, long)]
    verbose: bool,
}

fn parse_publish(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((channel, payload)) if !channel.is_empty() => {
            Ok((channel.to_string(), payload.to_string()))
        }
        _ => Err(format!("expected CHANNEL=PAYLOAD, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(cli.config.as_deref()).context("loading settings")?;
    if cli.json {
        settings.router.decode_json = true;
    }
    if cli.verbose {
        settings.logging.level = "debug".to_string();
    }
    init_logging(&settings.logging).map_err(|e| anyhow!(e))?;

    let transport = Arc::new(MemoryTransport::new(settings.event_capacity));
    let scheduler = Arc::new(TokioScheduler::new());
    let router = Arc::new(ChannelRouter::new(
        transport,
        settings.router.clone(),
        scheduler,
    ));
    let pump = router
        .spawn()
        .context("event pump is already running")?;
    router.wait_ready().await;

    let (tx, mut rx) = mpsc::unbounded_channel::<(String, Payload)>();
    let printer = ChannelListener::new(move |channel, payload: &Payload| {
        let _ = tx.send((channel.to_string(), payload.clone()));
    });

    router.subscribe(&cli.channels, Some(&printer))?;
    router.psubscribe(&cli.patterns, Some(&printer))?;

    for (channel, payload) in &cli.publish {
        let delivered = router.publish(channel, payload.as_str())?;
        info!(channel = %channel, delivered, "Published");
    }

    let linger = Duration::from_millis(cli.linger_ms);
    while let Ok(Some((channel, payload))) = timeout(linger, rx.recv()).await {
        println!("{channel}\t{payload}");
    }

    router.unsubscribe(&cli.channels, None)?;
    router.punsubscribe(&cli.patterns, None)?;
    info!(
        published = router.transport().publish_count(),
        "Shutting down"
    );
    router.transport().close();
    pump.await.context("event pump panicked")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_publish() {
        assert_eq!(
            parse_publish("news=a=b"),
            Ok(("news".to_string(), "a=b".to_string()))
        );
        assert!(parse_publish("=x").is_err());
        assert!(parse_publish("nochannel").is_err());
    }

    #[test]
    fn test_cli_args() {
        let cli = Cli::parse_from([
            "chanroute",
            "-c",
            "foo",
            "-p",
            "foo.*",
            "--publish",
            "foo.bar=howdy",
            "--json",
        ]);
        assert_eq!(cli.channels, vec!["foo"]);
        assert_eq!(cli.patterns, vec!["foo.*"]);
        assert_eq!(cli.publish, vec![("foo.bar".to_string(), "howdy".to_string())]);
        assert!(cli.json);
    }
}
