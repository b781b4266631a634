//! Plain-text serialization: one line per plan item.

use crate::error::Result;
use crate::pipeline::Pipeline;

pub(crate) async fn serialize(pipeline: &Pipeline) -> Result<String> {
    let items = pipeline.to_list().await?;
    let lines: Vec<String> = items.iter().map(|item| format!("* {item}")).collect();
    Ok(lines.join("\n"))
}
