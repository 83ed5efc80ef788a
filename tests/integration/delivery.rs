use crate::*;

use murmur_services::EnqueueError;

#[tokio::test]
async fn heartbeat_reaches_every_known_peer() -> Result<()> {
    let net = MemoryNetwork::new();
    let cipher = shared_cipher(CipherMode::StaticIv);
    let a = Node::spawn(&net, "node-a", cipher.clone());
    let b = Node::spawn(&net, "node-b", cipher.clone());
    let c = Node::spawn(&net, "node-c", cipher);
    a.knows(&b);
    a.knows(&c);

    let report = a.heartbeat(Duration::from_secs(5)).tick().await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 2);
    assert!(report.failed.is_empty());

    b.wait_for(&a, &[GREETING]).await?;
    c.wait_for(&a, &[GREETING]).await?;
    Ok(())
}

#[tokio::test]
async fn sent_messages_fan_out_through_the_queue() -> Result<()> {
    let net = MemoryNetwork::new();
    let cipher = shared_cipher(CipherMode::StaticIv);
    let a = Node::spawn(&net, "node-a", cipher.clone());
    let b = Node::spawn(&net, "node-b", cipher.clone());
    let c = Node::spawn(&net, "node-c", cipher);
    a.knows(&b);
    a.knows(&c);

    a.queue.enqueue("first").await?;
    a.queue.enqueue("second").await?;

    b.wait_for(&a, &["first", "second"]).await?;
    c.wait_for(&a, &["first", "second"]).await?;
    assert!(a.queue.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn empty_content_is_rejected_and_nothing_is_sent() {
    let net = MemoryNetwork::new();
    let cipher = shared_cipher(CipherMode::StaticIv);
    let a = Node::spawn(&net, "node-a", cipher.clone());
    let b = Node::spawn(&net, "node-b", cipher);
    a.knows(&b);

    assert_eq!(a.queue.enqueue("").await, Err(EnqueueError::ContentRequired));
    settle().await;

    assert_eq!(net.dial_count(&b.id), 0);
    assert!(b.inbox.list().await.is_empty());
}

#[tokio::test]
async fn periodic_heartbeat_keeps_arriving_until_shutdown() -> Result<()> {
    let net = MemoryNetwork::new();
    let cipher = shared_cipher(CipherMode::StaticIv);
    let a = Node::spawn(&net, "node-a", cipher.clone());
    let b = Node::spawn(&net, "node-b", cipher);
    a.knows(&b);

    let task = tokio::spawn(a.heartbeat(Duration::from_millis(20)).run());

    b.wait_for_count(&a, 3).await?;

    a.stop();
    task.await??;
    Ok(())
}
