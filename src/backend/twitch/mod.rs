/// Twitch chat integration
///
/// Reads a channel's chat over the IRC interface with IRCv3 tags enabled and
/// turns each PRIVMSG into a `ChatEvent`. The Helix API is only used to turn
/// the channel login into the id needed for channel badges.
///
/// # Example Usage
///
/// ```rust,no_run
/// use duofeed::backend::assets::AssetResolver;
/// use duofeed::backend::dispatch::EventDispatcher;
/// use duofeed::backend::normalize::MessageNormalizer;
/// use duofeed::backend::twitch::TwitchConnection;
///
/// #[tokio::main]
/// async fn main() {
///     let (dispatcher, mut feed) = EventDispatcher::new();
///     let normalizer = MessageNormalizer::new(AssetResolver::new());
///     let twitch = TwitchConnection::new(String::new(), dispatcher, normalizer);
///
///     twitch.connect("your_channel", "oauth:your_token").await.unwrap();
///
///     while let Some(event) = feed.recv().await {
///         println!("{:?}", event);
///     }
/// }
/// ```

mod api;
mod connection;
mod irc;

pub use api::{TwitchApi, UserData, UsersResponse};
pub use connection::TwitchConnection;
pub use irc::{is_login_failure, LineBuffer, Privmsg, ServerLine};
