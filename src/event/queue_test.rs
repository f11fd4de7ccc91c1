use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use crate::Event;
use crate::EventType;
use crate::Priority;
use crate::PriorityQueues;

fn event(priority: Priority) -> Event {
    Event::with_priority(EventType::StateChanged, json!({}), "test", priority)
}

#[tokio::test]
async fn test_strict_priority_pop_order() {
    let queues = PriorityQueues::new(8, 8);

    queues.push(event(Priority::Low)).await.expect("push low");
    queues.push(event(Priority::Critical)).await.expect("push critical");
    queues.push(event(Priority::Normal)).await.expect("push normal");
    queues.push(event(Priority::Background)).await.expect("push background");
    queues.push(event(Priority::High)).await.expect("push high");

    let order: Vec<Priority> = (0..5).map(|_| queues.try_pop().expect("pop").priority).collect();
    assert_eq!(
        order,
        vec![
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low,
            Priority::Background
        ]
    );
    assert!(queues.try_pop().is_none());
}

#[tokio::test]
async fn test_fifo_within_tier() {
    let queues = PriorityQueues::new(8, 8);
    for n in 0..3 {
        let mut e = event(Priority::Normal);
        e.payload = json!(n);
        queues.push(e).await.expect("push");
    }
    for n in 0..3 {
        assert_eq!(queues.try_pop().expect("pop").payload, json!(n));
    }
}

#[tokio::test]
async fn test_droppable_tier_drops_when_full() {
    let queues = PriorityQueues::new(8, 2);

    assert!(queues.push(event(Priority::Low)).await.expect("push"));
    assert!(queues.push(event(Priority::Low)).await.expect("push"));
    // full: dropped, not blocked
    assert!(!queues.push(event(Priority::Low)).await.expect("push"));
    assert_eq!(queues.depth(Priority::Low), 2);
}

#[tokio::test]
async fn test_blocking_tier_exerts_back_pressure() {
    let queues = std::sync::Arc::new(PriorityQueues::new(1, 1));

    queues.push(event(Priority::Critical)).await.expect("first push");

    let blocked = {
        let queues = queues.clone();
        tokio::spawn(async move { queues.push(event(Priority::Critical)).await })
    };
    tokio::task::yield_now().await;
    assert!(!blocked.is_finished());

    // draining one slot unblocks the producer
    queues.try_pop().expect("pop");
    let pushed = timeout(Duration::from_secs(1), blocked)
        .await
        .expect("producer should unblock")
        .expect("no panic")
        .expect("push succeeds");
    assert!(pushed);
}

#[tokio::test]
async fn test_pop_waits_for_push() {
    let queues = std::sync::Arc::new(PriorityQueues::new(8, 8));

    let waiter = {
        let queues = queues.clone();
        tokio::spawn(async move { queues.pop().await })
    };
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    queues.push(event(Priority::High)).await.expect("push");
    let popped = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("pop should wake")
        .expect("no panic");
    assert_eq!(popped.priority, Priority::High);
}

#[tokio::test]
async fn test_close_fails_blocked_producers() {
    let queues = std::sync::Arc::new(PriorityQueues::new(1, 1));
    queues.push(event(Priority::High)).await.expect("push");

    let blocked = {
        let queues = queues.clone();
        tokio::spawn(async move { queues.push(event(Priority::High)).await })
    };
    tokio::task::yield_now().await;

    queues.close();
    let result = timeout(Duration::from_secs(1), blocked)
        .await
        .expect("producer should fail fast")
        .expect("no panic");
    assert!(result.is_err());
}
