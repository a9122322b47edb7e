use codett3_transport::{
    ws::{self, Event},
    Transport,
};

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let transport = Transport::from_env()
        .map_err(|err| {
            println!("Create transport failed: {}", err);
            std::process::exit(1);
        })
        .unwrap();

    let path = std::env::args().nth(1).unwrap_or_else(|| "/ws/submissions".to_string());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let stream = transport
        .connect_stream::<serde_json::Value, _>(ws::Options::new(path), tx)
        .unwrap();

    let notifications = transport.connect_notifications().unwrap();
    notifications.on_message(|n| log::info!("Notification for {}: {}", n.user, n.message.text()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Some(Event::Message(message)) => {
                    log::info!("Received {:?}: {}", message.kind, message.data)
                }
                Some(event) => log::info!("Realtime event: {:?}", event),
                None => break,
            },
        }
    }

    stream.close().await;
    notifications.close();
}
