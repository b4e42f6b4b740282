// Chat command front end: long-polls the bot API and drives the coordinator

use crate::context::AppContext;
use crate::notifier::{ChatApi, IncomingMessage, ParseMode, TelegramNotifier, VideoAttachment};
use anyhow::{bail, Context as _};
use pawsense_core::report::{render_status, render_summary, GENERAL_TIPS, HELP_TEXT};
use pawsense_eye::{render_video_summary, VideoSummary};
use std::io::Write;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RETRY_DELAY: Duration = Duration::from_secs(5);
/// Largest video the bot API lets a bot download
pub const MAX_VIDEO_BYTES: u64 = 20 * 1024 * 1024;
const BEST_FRAME_QUALITY: u8 = 85;

const NOT_CONNECTED_TEXT: &str =
    "🔒 This chat is not connected. Send /connect CODE with the code shown in the server log.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Menu,
    Help,
    Status,
    Summary,
    Tips,
    MonitorOn,
    MonitorOff,
    Clear,
    RealtimeStart,
    RealtimeStop,
    /// Carries the code, empty when none was given
    Connect(String),
    Disconnect,
    Unknown(String),
}

impl BotCommand {
    /// None for plain text. `/cmd@BotName args` is accepted.
    pub fn parse(text: &str) -> Option<BotCommand> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        Some(match name.as_str() {
            "start" => BotCommand::Start,
            "menu" => BotCommand::Menu,
            "help" => BotCommand::Help,
            "status" => BotCommand::Status,
            "summary" => BotCommand::Summary,
            "tips" => BotCommand::Tips,
            "monitor_on" => BotCommand::MonitorOn,
            "monitor_off" => BotCommand::MonitorOff,
            "clear" => BotCommand::Clear,
            "realtime_start" => BotCommand::RealtimeStart,
            "realtime_stop" => BotCommand::RealtimeStop,
            "connect" => BotCommand::Connect(args.to_string()),
            "disconnect" => BotCommand::Disconnect,
            _ => BotCommand::Unknown(name),
        })
    }

    pub fn requires_authorization(&self) -> bool {
        !matches!(self, BotCommand::Start | BotCommand::Help | BotCommand::Connect(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub mode: ParseMode,
}

impl Reply {
    fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: ParseMode::Markdown,
        }
    }

    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: ParseMode::Plain,
        }
    }
}

const MENU_TEXT: &str = "🐕 *PawSense menu*\n\n\
📊 /status - current state\n\
📈 /summary - today's summary\n\
💡 /tips - care tips\n\
🟢 /monitor\\_on  🔴 /monitor\\_off\n\
🎥 /realtime\\_start  ⏹ /realtime\\_stop\n\
🗑 /clear - clear history";

/// Answer one command from `chat_id`
pub async fn handle_command(ctx: &AppContext, chat_id: &str, first_name: Option<&str>, command: BotCommand) -> Reply {
    let authorized = ctx.authorizer.lock().is_authorized(chat_id);
    if command.requires_authorization() && !authorized {
        info!("Rejected {:?} from unauthorized chat {}", command, chat_id);
        return Reply::plain(NOT_CONNECTED_TEXT);
    }

    match command {
        BotCommand::Start => {
            let greeting = match first_name {
                Some(name) => format!("🐕 Welcome to PawSense, {}!\n\n", name),
                None => "🐕 Welcome to PawSense!\n\n".to_string(),
            };
            let link = if authorized {
                "✅ This chat is connected and will receive alerts.\n\n"
            } else {
                "🔒 Send /connect CODE with the code shown in the server log to link this chat.\n\n"
            };
            Reply::markdown(format!("{}{}{}", greeting, link, HELP_TEXT))
        }
        BotCommand::Menu => Reply::markdown(MENU_TEXT),
        BotCommand::Help => Reply::markdown(HELP_TEXT),
        BotCommand::Status => {
            let mut text = render_status(&ctx.status());
            text.push_str(if ctx.monitor.is_running() {
                "\n🎥 Camera: *RUNNING*"
            } else {
                "\n🎥 Camera: *STOPPED*"
            });
            Reply::markdown(text)
        }
        BotCommand::Summary => Reply::markdown(render_summary(&ctx.summary())),
        BotCommand::Tips => Reply::markdown(GENERAL_TIPS),
        BotCommand::MonitorOn => {
            ctx.set_monitoring(true);
            Reply::plain("🟢 Monitoring resumed. Alerts are active.")
        }
        BotCommand::MonitorOff => {
            ctx.set_monitoring(false);
            Reply::plain("🔴 Monitoring paused. No alerts will be sent.")
        }
        BotCommand::Clear => {
            ctx.clear_history();
            Reply::plain("🗑 Emotion history cleared.")
        }
        BotCommand::RealtimeStart => match ctx.start_realtime().await {
            Ok(()) => Reply::plain("🎥 Real-time monitoring started."),
            Err(e) => Reply::plain(format!("⚠️ Could not start real-time monitoring: {}", e)),
        },
        BotCommand::RealtimeStop => {
            if ctx.stop_realtime().await {
                Reply::plain("⏹ Real-time monitoring stopped.")
            } else {
                Reply::plain("Real-time monitoring was not running.")
            }
        }
        BotCommand::Connect(code) => {
            if code.is_empty() {
                return Reply::plain("Usage: /connect CODE");
            }
            match ctx.authorizer.lock().connect(chat_id, &code) {
                Ok(()) => Reply::plain("✅ Chat connected. You can now control PawSense from here."),
                Err(_) => Reply::plain("❌ Invalid connection code."),
            }
        }
        BotCommand::Disconnect => {
            if ctx.authorizer.lock().disconnect(chat_id) {
                Reply::plain("👋 Chat disconnected.")
            } else {
                Reply::plain("This chat was not connected.")
            }
        }
        BotCommand::Unknown(name) => Reply::plain(format!("Unknown command /{}. Send /help for the list.", name)),
    }
}

/// Long-poll loop; ends when `token` is cancelled
pub fn spawn_bot(client: TelegramNotifier, ctx: AppContext, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("🤖 Chat bot polling for commands");
        let mut offset: Option<i64> = None;
        loop {
            let updates = tokio::select! {
                _ = token.cancelled() => break,
                updates = client.get_updates(offset) => updates,
            };
            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if let Some(message) = update.message {
                            process_message(&client, &ctx, message).await;
                        }
                    }
                }
                Err(e) => {
                    warn!("Polling for updates failed: {}", e);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }
        info!("Chat bot stopped");
    })
}

async fn process_message(client: &TelegramNotifier, ctx: &AppContext, message: IncomingMessage) {
    let chat_id = message.chat.id.to_string();
    if let Some(video) = message.video {
        // Analysis takes a while; keep polling meanwhile
        let client = client.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            handle_video_message(&client, &ctx, &chat_id, &video).await;
        });
        return;
    }

    let Some(command) = message.text.as_deref().and_then(BotCommand::parse) else {
        debug!("Ignoring non-command message from chat {}", chat_id);
        return;
    };
    let first_name = message.from.as_ref().and_then(|u| u.first_name.as_deref());
    let reply = handle_command(ctx, &chat_id, first_name, command).await;
    send_reply(client, &chat_id, &reply).await;
}

/// Analyze a video a connected chat sent and answer with the summary and the
/// most confident annotated frame
pub async fn handle_video_message(api: &dyn ChatApi, ctx: &AppContext, chat_id: &str, video: &VideoAttachment) {
    if !ctx.authorizer.lock().is_authorized(chat_id) {
        info!("Rejected video from unauthorized chat {}", chat_id);
        send_reply(api, chat_id, &Reply::plain(NOT_CONNECTED_TEXT)).await;
        return;
    }
    if ctx.vision.models().is_err() {
        send_reply(api, chat_id, &Reply::plain("⚠️ Video analysis is not available on this server.")).await;
        return;
    }
    if video.file_size.is_some_and(|size| size > MAX_VIDEO_BYTES) {
        info!("Video from chat {} is too large ({:?} bytes)", chat_id, video.file_size);
        send_reply(
            api,
            chat_id,
            &Reply::plain("❌ Video too large. The limit is 20 MB, please send a shorter or compressed clip."),
        )
        .await;
        return;
    }

    info!("📎 Video received from chat {}", chat_id);
    send_reply(
        api,
        chat_id,
        &Reply::plain("🎬 Video received. Downloading and analyzing your dog's emotions, this can take a while..."),
    )
    .await;

    match analyze_chat_video(api, ctx, video).await {
        Ok(summary) => {
            if let Err(e) = send_best_frame(api, chat_id, &summary).await {
                warn!("Could not send the best frame to chat {}: {:#}", chat_id, e);
            }
            send_reply(api, chat_id, &Reply::markdown(render_video_summary(&summary))).await;
        }
        Err(e) => {
            warn!("Video analysis for chat {} failed: {:#}", chat_id, e);
            send_reply(
                api,
                chat_id,
                &Reply::plain("❌ Could not analyze this video. Please try again with a different clip."),
            )
            .await;
        }
    }
}

async fn analyze_chat_video(api: &dyn ChatApi, ctx: &AppContext, video: &VideoAttachment) -> anyhow::Result<VideoSummary> {
    let extension = match video.mime_type.as_deref() {
        Some("video/quicktime") => "mov",
        Some("video/x-matroska") => "mkv",
        Some("video/x-msvideo") => "avi",
        _ => "mp4",
    };
    let download = tempfile::Builder::new()
        .prefix("pawsense-chat-")
        .suffix(&format!(".{}", extension))
        .tempfile()
        .context("could not create a download file")?;

    let size = api
        .download_file(&video.file_id, download.path())
        .await
        .context("download failed")?;
    if size > MAX_VIDEO_BYTES {
        bail!("downloaded video is {} bytes", size);
    }
    let summary = ctx.analyze_video(download.path()).await?;
    Ok(summary)
}

async fn send_best_frame(api: &dyn ChatApi, chat_id: &str, summary: &VideoSummary) -> anyhow::Result<()> {
    let Some(frame) = &summary.best_frame else {
        return Ok(());
    };
    let jpeg = frame.to_jpeg(BEST_FRAME_QUALITY)?;
    let mut file = tempfile::Builder::new()
        .prefix("pawsense-frame-")
        .suffix(".jpg")
        .tempfile()?;
    file.write_all(&jpeg)?;
    file.flush()?;
    api.send_photo_to(chat_id, file.path(), "🐕 Most confident frame").await?;
    Ok(())
}

/// A rejected Markdown reply is resent once as plain text
async fn send_reply(api: &dyn ChatApi, chat_id: &str, reply: &Reply) {
    if let Err(e) = api.send_message_to(chat_id, &reply.text, reply.mode).await {
        if reply.mode == ParseMode::Markdown {
            warn!("Formatted reply rejected, resending as plain text: {}", e);
            if let Err(e) = api.send_message_to(chat_id, &reply.text, ParseMode::Plain).await {
                warn!("Reply to chat {} failed: {}", chat_id, e);
            }
        } else {
            warn!("Reply to chat {} failed: {}", chat_id, e);
        }
    }
}
