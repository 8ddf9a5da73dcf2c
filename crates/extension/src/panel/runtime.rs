use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use vidchat_answer::{AnswerResult, AnswerService};
use vidchat_protocol::{Delivery, Envelope, TabId, VideoId, extract_video_id};

use super::controller::{PanelController, SubmitRejection};
use super::model::{BannerId, PanelSnapshot};
use crate::host::{MessageBus, TabHost};

#[derive(Debug)]
enum PanelCommand {
    Submit(String),
    ClearChat,
}

/// Completions posted back into the panel loop by its own background work.
#[derive(Debug)]
enum PanelEvent {
    AnswerReady {
        video_id: VideoId,
        result: AnswerResult<String>,
    },
    BannerExpired(BannerId),
}

/// Drives a [`PanelController`] attached to one tab's page.
pub struct PanelRuntime {
    tab: TabId,
    controller: PanelController,
    bus: Arc<MessageBus>,
    host: Arc<dyn TabHost>,
    service: Arc<dyn AnswerService>,
    banner_duration: Duration,
    events_tx: mpsc::UnboundedSender<PanelEvent>,
    snapshots: watch::Sender<PanelSnapshot>,
}

impl PanelRuntime {
    /// Attaches the panel to `tab` and starts its event loop.
    ///
    /// The page broadcast subscription is taken before this returns, so an identifier
    /// announced right after attach is never missed.
    pub fn attach(
        tab: TabId,
        controller: PanelController,
        bus: Arc<MessageBus>,
        host: Arc<dyn TabHost>,
        service: Arc<dyn AnswerService>,
        banner_duration: Duration,
    ) -> PanelHandle {
        let page = bus.page(tab).subscribe();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots, snapshots_rx) = watch::channel(controller.snapshot());

        let runtime = Self {
            tab,
            controller,
            bus,
            host,
            service,
            banner_duration,
            events_tx,
            snapshots,
        };
        let task = tokio::spawn(runtime.run(page, commands_rx, events_rx));
        tracing::debug!(tab = %tab, "panel attached");

        PanelHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut page: tokio::sync::broadcast::Receiver<Envelope>,
        mut commands: mpsc::UnboundedReceiver<PanelCommand>,
        mut events: mpsc::UnboundedReceiver<PanelEvent>,
    ) -> PanelController {
        let startup = startup_video_id(self.bus.clone(), self.host.clone());
        tokio::pin!(startup);
        let mut startup_pending = true;
        let mut page_open = true;

        loop {
            tokio::select! {
                video_id = &mut startup, if startup_pending => {
                    startup_pending = false;
                    self.on_startup_result(video_id);
                }
                message = page.recv(), if page_open => match message {
                    Ok(Envelope::VideoChanged { video_id }) => {
                        self.controller.accept_video_id(video_id);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(tab = %self.tab, skipped, "panel fell behind page broadcasts");
                    }
                    Err(RecvError::Closed) => page_open = false,
                },
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }

            self.publish();
        }

        tracing::debug!(tab = %self.tab, "panel detached");
        self.controller
    }

    fn on_startup_result(&mut self, video_id: Option<VideoId>) {
        match video_id {
            Some(video_id) if !self.controller.phase().is_active() => {
                self.controller.accept_video_id(video_id);
            }
            Some(video_id) => {
                tracing::debug!(tab = %self.tab, video_id = %video_id, "startup query lost the race to a page broadcast");
            }
            None => {
                tracing::debug!(tab = %self.tab, "no video known at panel startup");
            }
        }
    }

    fn handle_command(&mut self, command: PanelCommand) {
        match command {
            PanelCommand::Submit(input) => match self.controller.begin_submit(&input) {
                Ok(request) => {
                    let service = self.service.clone();
                    let events_tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let video_id = request.video_id.clone();
                        let result = service.ask(request).await;
                        let _ = events_tx.send(PanelEvent::AnswerReady { video_id, result });
                    });
                }
                Err(SubmitRejection::NoVideo { banner }) => self.schedule_banner_expiry(banner),
                Err(SubmitRejection::EmptyInput) => {}
            },
            PanelCommand::ClearChat => self.controller.clear_chat(),
        }
    }

    fn handle_event(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::AnswerReady { video_id, result } => {
                if let Some(banner) = self.controller.finish_submit(&video_id, result) {
                    self.schedule_banner_expiry(banner);
                }
            }
            PanelEvent::BannerExpired(banner) => {
                self.controller.dismiss_banner(banner);
            }
        }
    }

    fn schedule_banner_expiry(&self, banner: BannerId) {
        let events_tx = self.events_tx.clone();
        let duration = self.banner_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events_tx.send(PanelEvent::BannerExpired(banner));
        });
    }

    fn publish(&self) {
        let next = self.controller.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Asks the coordinator for the active video, falling back to the host's active tab.
async fn startup_video_id(bus: Arc<MessageBus>, host: Arc<dyn TabHost>) -> Option<VideoId> {
    match bus.request_runtime(Envelope::GetVideoId, None).await {
        Delivery::Delivered(reply) => {
            if let Some(video_id) = reply.into_video_id() {
                return Some(video_id);
            }
        }
        Delivery::NoListener => {
            tracing::debug!("coordinator did not answer the startup query");
        }
    }

    host.active_tab().and_then(|tab| extract_video_id(&tab.url))
}

/// Public side of a running panel.
#[derive(Debug)]
pub struct PanelHandle {
    commands: mpsc::UnboundedSender<PanelCommand>,
    snapshots: watch::Receiver<PanelSnapshot>,
    task: JoinHandle<PanelController>,
}

impl PanelHandle {
    pub fn submit(&self, input: impl Into<String>) -> bool {
        self.commands.send(PanelCommand::Submit(input.into())).is_ok()
    }

    pub fn clear_chat(&self) -> bool {
        self.commands.send(PanelCommand::ClearChat).is_ok()
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<PanelSnapshot> {
        self.snapshots.clone()
    }

    /// Waits for the first published snapshot satisfying `predicate`.
    ///
    /// Returns `None` if the panel stops first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&PanelSnapshot) -> bool,
    ) -> Option<PanelSnapshot> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = match snapshots.wait_for(predicate).await {
            Ok(snapshot) => Some(snapshot.clone()),
            Err(_) => None,
        };
        snapshot
    }

    /// Closes the panel and returns its final state.
    pub async fn detach(self) -> Option<PanelController> {
        let Self { commands, task, .. } = self;
        drop(commands);
        match task.await {
            Ok(controller) => Some(controller),
            Err(error) => {
                tracing::error!(error = %error, "panel task failed");
                None
            }
        }
    }
}
