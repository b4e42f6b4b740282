// Real-time monitoring, chat commands and dashboard commands against stub models

mod common;

use base64::Engine;
use common::*;
use pawsense_eye::Frame;
use pawsense_server::bot::{handle_command as bot_command, BotCommand};
use pawsense_server::dispatcher::JOB_TIMEOUT;
use pawsense_server::websocket::{handle_command as dashboard_command, ClientCommand};
use pawsense_server::{spawn_dispatcher, DispatchHandle, MonitorError, ServiceMetrics};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio_util::sync::CancellationToken;

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<pawsense_server::DashboardEvent>) -> Vec<pawsense_server::DashboardEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

#[tokio::test]
async fn test_sad_streak_raises_immediate_then_pattern_alerts() {
    let notifier = Arc::new(RecordingNotifier::default());
    let token = CancellationToken::new();
    let (alerts, dispatcher) = spawn_dispatcher(
        notifier.clone(),
        Arc::new(ServiceMetrics::new()),
        token.clone(),
        JOB_TIMEOUT,
    );
    let frames = (0..6).map(|_| sad_dog()).collect();
    let ctx = test_context(fast_config(), stub_backend(frames), alerts);
    let mut events = ctx.hub.subscribe();

    tokio_test::assert_ok!(ctx.start_realtime().await);
    let report = ctx.monitor.join().await.expect("capture loop report");

    assert_eq!(report.frames, 6);
    assert_eq!(report.classifications, 6);
    assert_eq!(report.alerts, 3);
    assert_eq!(report.dropped, 0);

    let status = ctx.status();
    assert_eq!(status.history_len, 6);
    assert_eq!(status.stats.alerts_emitted, 3);
    assert_eq!(status.stats.pattern_alerts, 2);

    let events = drain_events(&mut events);
    let kinds: Vec<String> = events
        .iter()
        .filter(|e| e.event == "alert")
        .map(|e| e.data["kind"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, vec!["immediate", "pattern", "pattern"]);
    assert_eq!(events.iter().filter(|e| e.event == "emotion_update").count(), 6);
    assert_eq!(events.first().map(|e| e.event.as_str()), Some("detection_started"));
    assert_eq!(events.last().map(|e| e.event.as_str()), Some("detection_stopped"));

    // every alert carries the captured frame as a photo
    let mut delivered = 0;
    for _ in 0..100 {
        delivered = notifier.sent.lock().len();
        if delivered == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(delivered, 3);
    assert!(notifier.sent.lock().iter().all(|s| s.starts_with("image:") && s.contains("SAD")));

    token.cancel();
    dispatcher.await.unwrap();
}

#[tokio::test]
async fn test_pushed_frames_carry_the_dog_box() {
    let frame = Frame::filled(96, 96, [200, 30, 220]).unwrap();
    let ctx = test_context(fast_config(), stub_backend(vec![frame]), DispatchHandle::disabled());
    let mut events = ctx.hub.subscribe();

    tokio_test::assert_ok!(ctx.start_realtime().await);
    ctx.monitor.join().await.expect("capture loop report");

    let events = drain_events(&mut events);
    let update = events
        .iter()
        .find(|e| e.event == "frame_update")
        .expect("one frame pushed");
    assert_eq!(update.data["dogs"], 1);

    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(update.data["frame"].as_str().unwrap())
        .unwrap();
    let pushed = Frame::decode(&jpeg).unwrap();
    let [_, g, _] = pushed.pixel(0, 48).unwrap();
    assert!(g > 100, "box edge should be green, got g={}", g);
    let [_, g, r] = pushed.pixel(48, 48).unwrap();
    assert!(r > 150 && g < 100, "interior should be untouched, got g={} r={}", g, r);
}

#[tokio::test]
async fn test_paused_monitoring_records_without_alerts() {
    let frames = (0..4).map(|_| sad_dog()).collect();
    let ctx = test_context(fast_config(), stub_backend(frames), DispatchHandle::disabled());
    ctx.set_monitoring(false);

    ctx.start_realtime().await.unwrap();
    let report = ctx.monitor.join().await.unwrap();

    assert_eq!(report.classifications, 4);
    assert_eq!(report.alerts, 0);
    assert_eq!(ctx.status().history_len, 4);
    assert_eq!(ctx.summary().total, 4);
}

#[tokio::test]
async fn test_frames_without_dogs_are_not_classified() {
    let frames = vec![empty_room(), happy_dog(), empty_room()];
    let ctx = test_context(fast_config(), stub_backend(frames), DispatchHandle::disabled());

    ctx.start_realtime().await.unwrap();
    let report = ctx.monitor.join().await.unwrap();

    assert_eq!(report.frames, 3);
    assert_eq!(report.classifications, 1);
    assert_eq!(report.alerts, 0);
}

#[tokio::test]
async fn test_second_start_is_rejected_until_stopped() {
    let mut config = fast_config();
    config.server.frame_rate = 1;
    let frames = (0..30).map(|_| happy_dog()).collect();
    let ctx = test_context(config, stub_backend(frames), DispatchHandle::disabled());

    ctx.start_realtime().await.unwrap();
    assert!(ctx.monitor.is_running());
    assert!(matches!(ctx.start_realtime().await, Err(MonitorError::AlreadyRunning)));

    assert!(ctx.stop_realtime().await);
    assert!(!ctx.monitor.is_running());
    assert!(!ctx.stop_realtime().await);
}

#[tokio::test]
async fn test_chat_commands_require_connection() {
    let mut config = fast_config();
    config.telegram.chat_id = Some("1001".to_string());
    let ctx = test_context(config, stub_backend(vec![]), DispatchHandle::disabled());

    let reply = bot_command(&ctx, "2002", None, BotCommand::Status).await;
    assert!(reply.text.contains("not connected"));

    let reply = bot_command(&ctx, "2002", None, BotCommand::Connect("wrong".to_string())).await;
    assert!(reply.text.contains("Invalid"));

    let code = ctx.authorizer.lock().code().to_string();
    let reply = bot_command(&ctx, "2002", Some("Ana"), BotCommand::Connect(code.to_lowercase())).await;
    assert!(reply.text.contains("connected"));

    let reply = bot_command(&ctx, "2002", None, BotCommand::MonitorOff).await;
    assert!(reply.text.contains("paused"));
    assert!(!ctx.status().monitoring);

    // the owner chat never needs a code
    let reply = bot_command(&ctx, "1001", None, BotCommand::Status).await;
    assert!(reply.text.contains("PAUSED"));

    let reply = bot_command(&ctx, "2002", None, BotCommand::Disconnect).await;
    assert!(reply.text.contains("disconnected"));
    let reply = bot_command(&ctx, "2002", None, BotCommand::MonitorOn).await;
    assert!(reply.text.contains("not connected"));
}

#[tokio::test]
async fn test_dashboard_commands() {
    let ctx = test_context(fast_config(), stub_backend(vec![]), DispatchHandle::disabled());

    let reply = dashboard_command(&ctx, ClientCommand::Ping).await;
    assert_eq!(reply.event, "pong");

    let reply = dashboard_command(&ctx, ClientCommand::SetMonitoring { enabled: false }).await;
    assert_eq!(reply.event, "status");
    assert_eq!(reply.data["monitoring"], false);

    let reply = dashboard_command(&ctx, ClientCommand::TestTelegram).await;
    assert_eq!(reply.data["status"], "error");

    let reply = dashboard_command(&ctx, ClientCommand::StopDetection).await;
    assert_eq!(reply.data["was_running"], false);
}
