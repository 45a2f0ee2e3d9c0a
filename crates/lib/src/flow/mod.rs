//! Message flow: what the bridge does with one inbound message.

mod dispatcher;
mod options;
mod products;
mod prompt;
mod thread;

pub use dispatcher::{
    unsupported_text, DispatchAck, DispatchError, Dispatcher, MessageKind, IMAGE_RECEIVED_TEXT,
    SEARCHING_PRODUCTS_TEXT,
};
pub use options::DispatchOptions;
pub use products::{
    build_card, find_product_marker, parse_product_ids, product_image_url, send_products_carousel,
    CAROUSEL_CAPTION, MAX_CAROUSEL_CARDS,
};
pub use prompt::{base_prompt, compose_prompt, DEFAULT_PROMPT};
pub use thread::{ensure_thread, thread_id_of};
