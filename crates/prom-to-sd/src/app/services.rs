use std::sync::Arc;

use crate::scraper::Scrape;
use crate::sender::BatchSender;
use crate::translator::Translator;

/// Components shared by every source worker.
pub struct ApplicationServices {
    pub scraper: Arc<dyn Scrape>,
    pub translator: Arc<Translator>,
    pub sender: Arc<BatchSender>,
}
