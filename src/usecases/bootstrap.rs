use std::path::Path;

use crate::{
    infra::{
        self, config::FileConfigAdapter, contracts::ConfigAdapter, error::AppError,
        storage_layout::StorageLayout,
    },
    usecases::context::AppContext,
};

pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let context = build_context(config_path)?;
    let guard = infra::logging::init(&context.config.logging, &context.layout.log_dir())?;

    Ok(context.with_log_guard(guard))
}

fn build_context(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let config = FileConfigAdapter::new(config_path).load()?;
    let layout = StorageLayout::resolve()?;
    layout.ensure_dirs()?;

    Ok(AppContext::new(config, layout))
}
