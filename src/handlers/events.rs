use super::Services;
use crate::dispatcher::{Handler, HandlerResponse};
use crate::events::{EventBus, EventSubscription};
use crate::router::{HandlerGroup, RouteDef};
use crate::server::HttpRequest;
use crate::sse::{self, SseSender};
use std::rc::Rc;
use tracing::{debug, info};

/// `/api/events`: every application event as a server-sent event.
pub struct EventsHandler {
    bus: EventBus,
}

impl EventsHandler {
    pub fn new(services: &Services) -> Self {
        Self {
            bus: services.bus.clone(),
        }
    }

    fn stream(&self, _req: HttpRequest) -> anyhow::Result<HandlerResponse> {
        let (sender, receiver) = sse::channel();
        let events = self.bus.subscribe();
        info!(subscribers = self.bus.subscriber_count(), "Event stream opened");
        tokio::spawn(forward(events, sender));
        Ok(HandlerResponse::Stream(receiver))
    }
}

/// Forward bus events until the client leaves or the bus closes. Dropping
/// the sender ends the stream with the `done` frame.
async fn forward(mut events: EventSubscription, sender: SseSender) {
    loop {
        tokio::select! {
            () = sender.closed() => {
                debug!("Event stream client gone");
                return;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Event bus closed; ending stream");
                    return;
                };
                let payload = event.stream_payload().to_string();
                if sender.emit(event.message_type().as_str(), payload).is_err() {
                    return;
                }
            }
        }
    }
}

impl HandlerGroup for EventsHandler {
    fn base_path(&self) -> &str {
        "/api/events"
    }

    fn routes(self: Rc<Self>) -> Vec<RouteDef> {
        vec![RouteDef::get("/", Handler::bind("event_stream", &self, Self::stream))]
    }
}
