use futures::channel::mpsc;
use futures::SinkExt;

/// Verbatim pass-through from the completion source to the client. The
/// bounded channel it writes into is the pipeline's only backpressure
/// point; dropping the forwarder closes the stream, which is the client's
/// end-of-turn signal.
pub struct ClientForwarder {
    out: mpsc::Sender<String>,
    open: bool,
}

impl ClientForwarder {
    pub fn new(out: mpsc::Sender<String>) -> Self {
        Self { out, open: true }
    }

    /// Sends one fragment; returns false once the client has gone away.
    pub async fn forward(&mut self, fragment: &str) -> bool {
        if !self.open {
            return false;
        }
        if self.out.send(fragment.to_string()).await.is_err() {
            self.open = false;
        }
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::StreamExt;

    #[test]
    fn forwards_fragments_verbatim_in_order() {
        block_on(async {
            let (tx, rx) = mpsc::channel(8);
            let mut forwarder = ClientForwarder::new(tx);
            assert!(forwarder.forward("Hello").await);
            assert!(forwarder.forward(", ").await);
            assert!(forwarder.forward("world").await);
            drop(forwarder);

            let got: Vec<String> = rx.collect().await;
            assert_eq!(got, vec!["Hello", ", ", "world"]);
        });
    }

    #[test]
    fn reports_disconnect_once_receiver_is_gone() {
        block_on(async {
            let (tx, rx) = mpsc::channel(8);
            let mut forwarder = ClientForwarder::new(tx);
            drop(rx);
            assert!(!forwarder.forward("lost").await);
            assert!(!forwarder.forward("still lost").await);
        });
    }
}
