use super::{check, Action};
use anyhow::Result;

pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Check(args) => check::handle(args).await,
    }
}
