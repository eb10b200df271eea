use std::sync::Arc;
use std::time::Duration;

use oltwatch_devkit::test_utils::device;
use oltwatch_devkit::MockSessionClient;
use oltwatch_kernel::dispatch::Dispatcher;
use oltwatch_kernel::models::{Credentials, Dialect, Outcome, Roster};
use tokio::sync::mpsc;

async fn drain(mut rx: mpsc::Receiver<Outcome>) -> Vec<Outcome> {
    let mut out = Vec::new();
    while let Some(outcome) = rx.recv().await {
        out.push(outcome);
    }
    out
}

fn fleet(n: usize) -> Vec<oltwatch_kernel::models::Device> {
    (1..=n).map(|i| device(&format!("OLT-{i}"), "Lab", &format!("10.0.0.{i}"))).collect()
}

#[tokio::test(start_paused = true)]
async fn test_never_more_than_n_sessions_open() {
    let client = MockSessionClient::new();
    client.delay_all(Duration::from_secs(30)).default_reply("ok");
    let dispatcher = Dispatcher::new(Arc::new(client.clone()), Credentials::default(), 2);

    let outcomes = drain(dispatcher.dispatch(Dialect::Nokia, fleet(5), &["show x".to_string()])).await;

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert_eq!(client.max_open(), 2);
    assert_eq!(client.opens(), 5);
    assert_eq!(client.closes(), 5);
    assert_eq!(client.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bound_holds_for_large_fleet() {
    let client = MockSessionClient::new();
    client.delay_all(Duration::from_millis(250));
    let dispatcher = Dispatcher::new(Arc::new(client.clone()), Credentials::default(), 7);

    let outcomes = drain(dispatcher.dispatch(Dialect::Nokia, fleet(60), &["show x".to_string()])).await;

    assert_eq!(outcomes.len(), 60);
    assert!(client.max_open() <= 7);
}

#[tokio::test(start_paused = true)]
async fn test_failing_device_does_not_block_others() {
    let client = MockSessionClient::new();
    client
        .default_reply("fine")
        .delay_all(Duration::from_secs(5))
        .fail_open("10.0.0.2", "authentication failed")
        .fail_send("10.0.0.4", "connection reset");
    let dispatcher = Dispatcher::new(Arc::new(client.clone()), Credentials::default(), 2);

    // the channel closes once every device produced its outcome
    let outcomes = drain(dispatcher.dispatch(Dialect::Nokia, fleet(5), &["show x".to_string()])).await;

    assert_eq!(outcomes.len(), 5);
    let mut failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .map(|o| o.device.host.as_str())
        .collect();
    failed.sort();
    assert_eq!(failed, vec!["10.0.0.2", "10.0.0.4"]);
    for outcome in outcomes.iter().filter(|o| o.result.is_ok()) {
        assert_eq!(outcome.result.as_ref().unwrap().text, "fine");
    }
    assert_eq!(client.open_now(), 0);
}

#[tokio::test]
async fn test_batch_commands_joined_in_order() {
    let client = MockSessionClient::new();
    client
        .reply("10.0.0.1", "show a", "alpha")
        .reply("10.0.0.1", "show b", "beta");
    let dispatcher = Dispatcher::new(Arc::new(client.clone()), Credentials::default(), 3);

    let cmds = vec!["show a".to_string(), "show b".to_string()];
    let outcomes = drain(dispatcher.dispatch(Dialect::Nokia, fleet(1), &cmds)).await;

    let output = outcomes[0].result.as_ref().unwrap();
    assert_eq!(output.text, "alpha\nbeta");
    assert_eq!(output.per_command.len(), 2);
    assert_eq!(client.commands_for("10.0.0.1"), cmds);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_all_interleaves_groups_with_own_commands() {
    let client = MockSessionClient::new();
    client.delay_all(Duration::from_secs(1)).default_reply("cfg");
    let dispatcher = Dispatcher::new(Arc::new(client.clone()), Credentials::default(), 2);

    let roster = Roster {
        primary: fleet(3),
        secondary: vec![device("HW-1", "Lab", "10.90.3.1"), device("HW-2", "Lab", "10.90.3.2")],
    };
    let outcomes = drain(dispatcher.dispatch_all(
        roster,
        &["info configure flat".to_string()],
        &["display current-configuration".to_string()],
    ))
    .await;

    assert_eq!(outcomes.len(), 5);
    assert_eq!(outcomes.iter().filter(|o| o.dialect == Dialect::Huawei).count(), 2);
    assert!(client.max_open() <= 2);

    for cmd in client.recorded_commands() {
        match cmd.dialect {
            Dialect::Nokia => assert_eq!(cmd.command, "info configure flat"),
            Dialect::Huawei => assert_eq!(cmd.command, "display current-configuration"),
        }
    }
}

#[tokio::test]
async fn test_empty_fleet_closes_immediately() {
    let client = MockSessionClient::new();
    let dispatcher = Dispatcher::new(Arc::new(client.clone()), Credentials::default(), 2);
    let outcomes = drain(dispatcher.dispatch(Dialect::Nokia, Vec::new(), &["show x".to_string()])).await;
    assert!(outcomes.is_empty());
    assert_eq!(client.opens(), 0);
}
