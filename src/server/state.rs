use crate::pipeline::MemeCreator;

pub(crate) struct ServerState {
    pub(crate) creator: MemeCreator,
}
