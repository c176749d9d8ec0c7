use async_trait::async_trait;

use coffee_core::result::AppResult;
use coffee_entity::author::LocalAuthor;

use crate::context::WorkerContext;
use crate::task::WorkerTask;

/// List the registered local authors.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAuthorsTask;

#[async_trait]
impl WorkerTask for LocalAuthorsTask {
    type Output = Vec<LocalAuthor>;

    fn name(&self) -> &'static str {
        "local-authors"
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<Vec<LocalAuthor>> {
        ctx.authors()?.list().await
    }
}
