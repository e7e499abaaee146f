use std::path::PathBuf;

use super::{FlowFileInput, FlowFileSource, FlowFileStream};

/// Files named explicitly, e.g. on the command line. Yielded in the given order.
pub struct PathListSource {
    paths: Vec<PathBuf>,
}

impl PathListSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait::async_trait]
impl FlowFileSource for PathListSource {
    async fn stream(&self) -> FlowFileStream {
        let paths = self.paths.clone();
        let s = async_stream::stream! {
            for path in paths {
                yield FlowFileInput::read(&path).await;
            }
        };
        Box::pin(s)
    }
}
