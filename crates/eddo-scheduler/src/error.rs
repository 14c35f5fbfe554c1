use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Core(#[from] eddo_core::CoreError),

    #[error(transparent)]
    Users(#[from] eddo_users::UserError),

    #[error(transparent)]
    Todo(#[from] eddo_todo::TodoError),

    #[error(transparent)]
    Email(#[from] eddo_email::EmailError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
