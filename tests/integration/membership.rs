use crate::*;

/// A receiving node registers the sender for the life of the stream and
/// drops it again once the stream closes.
#[tokio::test]
async fn inbound_stream_registers_then_deregisters_sender() -> Result<()> {
    let net = MemoryNetwork::new();
    let cipher = shared_cipher(CipherMode::StaticIv);
    let a = Node::spawn(&net, "node-a", cipher.clone());
    let b = Node::spawn(&net, "node-b", cipher);
    a.knows(&b);

    a.heartbeat(Duration::from_secs(5)).tick().await;

    b.wait_for(&a, &[GREETING]).await?;
    b.wait_until_forgotten(&a.id).await?;

    // The sender's own view is untouched by a successful send.
    assert!(a.registry.contains(&b.id));
    Ok(())
}

#[tokio::test]
async fn unreachable_peer_is_pruned_while_others_still_receive() -> Result<()> {
    let net = MemoryNetwork::new();
    let cipher = shared_cipher(CipherMode::StaticIv);
    let a = Node::spawn(&net, "node-a", cipher.clone());
    let b = Node::spawn(&net, "node-b", cipher);
    a.knows(&b);
    let ghost = PeerId::from("ghost");
    a.registry.upsert(&ghost);

    a.queue.enqueue("still here?").await?;

    b.wait_for(&a, &["still here?"]).await?;
    a.wait_until_forgotten(&ghost).await?;
    assert!(a.registry.contains(&b.id));
    assert_eq!(net.dial_count(&ghost), 1);
    assert_eq!(net.dial_count(&b.id), 1);
    Ok(())
}

#[tokio::test]
async fn peer_that_left_is_dropped_on_next_heartbeat() {
    let net = MemoryNetwork::new();
    let cipher = shared_cipher(CipherMode::StaticIv);
    let a = Node::spawn(&net, "node-a", cipher.clone());
    let b = Node::spawn(&net, "node-b", cipher);
    a.knows(&b);

    let heartbeat = a.heartbeat(Duration::from_secs(5));
    assert_eq!(heartbeat.tick().await.delivered, 1);

    net.leave(&b.id);
    let report = heartbeat.tick().await;
    assert_eq!(report.failed, vec![b.id.clone()]);
    assert!(a.registry.is_empty());

    // Nothing left to send to.
    assert_eq!(heartbeat.tick().await.attempted, 0);
}

#[tokio::test]
async fn mutual_peers_exchange_greetings() -> Result<()> {
    let net = MemoryNetwork::new();
    let cipher = shared_cipher(CipherMode::StaticIv);
    let a = Node::spawn(&net, "node-a", cipher.clone());
    let b = Node::spawn(&net, "node-b", cipher);
    a.knows(&b);
    b.knows(&a);

    // Both rounds snapshot their registry before either inbound session
    // gets to run and close.
    let (hb_a, hb_b) = (a.heartbeat(Duration::from_secs(5)), b.heartbeat(Duration::from_secs(5)));
    let (ra, rb) = tokio::join!(hb_a.tick(), hb_b.tick());
    assert_eq!((ra.delivered, rb.delivered), (1, 1));

    a.wait_for(&b, &[GREETING]).await?;
    b.wait_for(&a, &[GREETING]).await?;

    // Closing an inbound session removes the remote, even one we knew
    // about before it dialed us.
    a.wait_until_forgotten(&b.id).await?;
    b.wait_until_forgotten(&a.id).await?;
    Ok(())
}
