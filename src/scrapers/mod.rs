pub mod avenue;
pub mod dealabs;
pub mod http;
pub mod markup;
pub mod pagination;
pub mod session;
pub mod traits;
pub mod types;
pub mod vinted;

pub use avenue::AvenueSource;
pub use dealabs::DealabsSource;
pub use http::build_client;
pub use markup::MarkupAdapter;
pub use traits::SourceAdapter;
pub use types::SearchParams;
pub use vinted::VintedAdapter;
