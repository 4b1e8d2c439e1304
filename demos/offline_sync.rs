use std::time::Duration;

use offline_queue_http::{Connectivity, OfflineQueue, QueueEvent, QueueOptions, RequestOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = QueueOptions::from_env().map_err(anyhow::Error::msg)?;
    let connectivity = Connectivity::offline();
    let queue = OfflineQueue::new(connectivity.clone(), options);
    let mut events = queue.subscribe();

    let body = json!({"title": "Harvest supper", "date": "2026-11-07"});
    let id = queue.add("/api/events", RequestOptions::post().json(&body)?);
    println!("queued {id} ({} pending)", queue.size());

    connectivity.set_online(true);

    while !queue.is_empty() {
        match tokio::time::timeout(Duration::from_secs(30), events.recv()).await {
            Ok(Some(QueueEvent::Synced { request })) => println!("synced {}", request.id),
            Ok(Some(QueueEvent::Failed { request, error })) => {
                println!(
                    "gave up on {} after {} attempts: {error}",
                    request.id, request.retry_count
                )
            }
            Ok(None) | Err(_) => break,
        }
    }

    let leftover = queue.shutdown();
    println!("{} requests still pending at shutdown", leftover.len());
    Ok(())
}
