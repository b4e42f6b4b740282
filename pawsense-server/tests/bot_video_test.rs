// Videos sent to the chat bot: gatekeeping, download and the summary reply

mod common;

use async_trait::async_trait;
use common::*;
use mockall::mock;
use mockall::predicate::eq;
use pawsense_server::bot::{handle_video_message, MAX_VIDEO_BYTES};
use pawsense_server::{AppContext, ChatApi, DispatchHandle, NotifyError, ParseMode, VideoAttachment};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

mock! {
    pub Chat {}

    #[async_trait]
    impl ChatApi for Chat {
        async fn send_message_to(&self, chat_id: &str, text: &str, mode: ParseMode) -> Result<(), NotifyError>;
        async fn send_photo_to(&self, chat_id: &str, path: &Path, caption: &str) -> Result<(), NotifyError>;
        async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, NotifyError>;
    }
}

const OWNER: &str = "4242";

fn context() -> AppContext {
    let ctx = test_context(fast_config(), stub_backend(vec![]), DispatchHandle::disabled());
    ctx.authorizer.lock().preauthorize(OWNER);
    ctx
}

fn clip(size: Option<u64>) -> VideoAttachment {
    VideoAttachment {
        file_id: "clip-1".to_string(),
        file_size: size,
        mime_type: Some("video/mp4".to_string()),
    }
}

/// Record every text reply
fn record_replies(chat: &mut MockChat) -> Arc<Mutex<Vec<(String, ParseMode)>>> {
    let replies = Arc::new(Mutex::new(Vec::new()));
    let sink = replies.clone();
    chat.expect_send_message_to()
        .withf(|chat_id, _, _| chat_id == OWNER || chat_id == "999")
        .returning(move |_, text, mode| {
            sink.lock().push((text.to_string(), mode));
            Ok(())
        });
    replies
}

#[tokio::test]
async fn test_video_is_analyzed_and_summarized() {
    let ctx = context();
    let mut chat = MockChat::new();
    chat.expect_download_file()
        .with(eq("clip-1"), mockall::predicate::always())
        .times(1)
        .returning(|_, dest| {
            std::fs::write(dest, b"not really a video")?;
            Ok(18)
        });
    chat.expect_send_photo_to()
        .withf(|chat_id, path, _| chat_id == OWNER && path.exists())
        .times(1)
        .returning(|_, _, _| Ok(()));
    let replies = record_replies(&mut chat);

    handle_video_message(&chat, &ctx, OWNER, &clip(Some(4096))).await;

    let replies = replies.lock();
    assert_eq!(replies.len(), 2);
    assert!(replies[0].0.contains("Video received"));
    let (summary, mode) = &replies[1];
    assert_eq!(*mode, ParseMode::Markdown);
    assert!(summary.contains("VIDEO ANALYSIS COMPLETE"));
    assert!(summary.contains("SAD"));

    assert_eq!(ctx.metrics.snapshot().analyses, 1);
    assert_eq!(ctx.status().history_len, 0);
}

#[tokio::test]
async fn test_unauthorized_chat_cannot_send_videos() {
    let ctx = context();
    let mut chat = MockChat::new();
    chat.expect_download_file().never();
    chat.expect_send_photo_to().never();
    let replies = record_replies(&mut chat);

    handle_video_message(&chat, &ctx, "999", &clip(Some(4096))).await;

    let replies = replies.lock();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].0.contains("not connected"));
    assert_eq!(ctx.metrics.snapshot().analyses, 0);
}

#[tokio::test]
async fn test_oversized_video_is_refused_before_download() {
    let ctx = context();
    let mut chat = MockChat::new();
    chat.expect_download_file().never();
    let replies = record_replies(&mut chat);

    handle_video_message(&chat, &ctx, OWNER, &clip(Some(MAX_VIDEO_BYTES + 1))).await;

    let replies = replies.lock();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].0.contains("too large"));
}

#[tokio::test]
async fn test_failed_download_reports_error() {
    let ctx = context();
    let mut chat = MockChat::new();
    chat.expect_download_file()
        .times(1)
        .returning(|_, _| Err(NotifyError::Api("file is gone".to_string())));
    chat.expect_send_photo_to().never();
    let replies = record_replies(&mut chat);

    handle_video_message(&chat, &ctx, OWNER, &clip(None)).await;

    let replies = replies.lock();
    assert_eq!(replies.len(), 2);
    assert!(replies[1].0.contains("Could not analyze"));
    assert_eq!(ctx.metrics.snapshot().analyses, 0);
}

#[tokio::test]
async fn test_rejected_markdown_summary_is_resent_plain() {
    let ctx = context();
    let mut chat = MockChat::new();
    chat.expect_download_file().returning(|_, _| Ok(1));
    chat.expect_send_photo_to().returning(|_, _, _| Ok(()));
    let plain = Arc::new(Mutex::new(Vec::new()));
    let sink = plain.clone();
    chat.expect_send_message_to()
        .returning(move |_, text, mode| match mode {
            ParseMode::Markdown => Err(NotifyError::Api("can't parse entities".to_string())),
            ParseMode::Plain => {
                sink.lock().push(text.to_string());
                Ok(())
            }
        });

    handle_video_message(&chat, &ctx, OWNER, &clip(Some(1))).await;

    let plain = plain.lock();
    assert_eq!(plain.len(), 2);
    assert!(plain[1].contains("VIDEO ANALYSIS COMPLETE"));
}
