//! YAML serialization: a rendering of the JSON wire shape.

use crate::error::Result;
use crate::pipeline::Pipeline;

use super::{json, SerializationOptions};

pub(crate) async fn serialize(
    pipeline: &Pipeline,
    options: SerializationOptions,
) -> Result<String> {
    let value = json::serialize(pipeline, options).await?;
    Ok(serde_yaml::to_string(&value)?)
}
