/// Unit of work passed from the transport to the dispatch thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Raw payload received from a client; the dequeuer takes ownership.
    DataReceived(Vec<u8>),
    /// Sentinel asking the dispatch thread to shut down.
    ExitRequested,
}
