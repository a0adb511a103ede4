use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::tungstenite::Message;

use desklink::{
    config::Config,
    protocol::Command,
    remote::Client,
    state::{ConnectionStatus, StateValue},
    target::ConnectionTarget,
};

const WAIT: Duration = Duration::from_secs(5);

async fn next_value(updates: &mut mpsc::UnboundedReceiver<StateValue>) -> StateValue {
    tokio::time::timeout(WAIT, updates.recv())
        .await
        .expect("state update in time")
        .expect("client alive")
}

#[tokio::test]
async fn talks_to_a_websocket_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (received_tx, mut received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

        ws.send(Message::text(r#"{"Artist":"A","Title":"T","Playing":true}"#))
            .await
            .unwrap();
        ws.send(Message::binary(vec![1, 2, 3])).await.unwrap();
        ws.send(Message::text("No media playing")).await.unwrap();

        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = received_tx.send(text.as_str().to_owned());
        }
        let _ = ws.close(None).await;
    });

    let client = Client::new(Config::default()).unwrap();
    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let _subscription = client.subscribe(move |_, value| {
        let _ = updates_tx.send(value.clone());
    });

    client.start(ConnectionTarget::new("127.0.0.1", port.to_string()).unwrap());
    assert_eq!(
        next_value(&mut updates).await,
        StateValue::Connection(ConnectionStatus::Connecting)
    );
    assert_eq!(
        next_value(&mut updates).await,
        StateValue::Connection(ConnectionStatus::Connected)
    );

    let StateValue::Track(track) = next_value(&mut updates).await else {
        panic!("expected track");
    };
    assert_eq!(track.title.as_deref(), Some("T"));
    assert!(track.playing);

    // The binary frame is skipped.
    let StateValue::Track(track) = next_value(&mut updates).await else {
        panic!("expected track");
    };
    assert!(!track.playing);
    assert_eq!(track.title.as_deref(), Some("T"));

    client.send_command(Command::Next).await.unwrap();
    let sent = tokio::time::timeout(WAIT, received.recv()).await.unwrap();
    assert_eq!(sent.as_deref(), Some("next"));

    assert_eq!(
        next_value(&mut updates).await,
        StateValue::Connection(ConnectionStatus::Disconnected)
    );
    client.stop().await;
}

#[tokio::test]
async fn refused_connection_is_reported_as_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::new(Config::default()).unwrap();
    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let _subscription = client.subscribe(move |_, value| {
        let _ = updates_tx.send(value.clone());
    });

    client.start(ConnectionTarget::new("127.0.0.1", port.to_string()).unwrap());
    assert_eq!(
        next_value(&mut updates).await,
        StateValue::Connection(ConnectionStatus::Connecting)
    );
    assert_eq!(
        next_value(&mut updates).await,
        StateValue::Connection(ConnectionStatus::Disconnected)
    );

    client.stop().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}
