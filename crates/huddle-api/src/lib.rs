pub mod groups;
pub mod users;

use std::sync::Arc;

use huddle_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
}
