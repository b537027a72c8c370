//! Meal photo processing.
//!
//! Every inbound message flows through `FoodPipeline::handle()`:
//! 1. non-image messages get a prompt for a photo
//! 2. the photo is fetched and stored as a scoped `ImageAsset`
//! 3. the recognizer turns it into ranked food labels
//! 4. the top labels are resolved to nutrition estimates and summed
//! 5. one formatted summary goes back to the sender

pub mod aggregate;
pub mod asset;
pub mod processor;
pub mod reply;
pub mod types;
