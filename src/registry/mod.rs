pub mod arguments;
pub mod handler;
pub mod loader;

pub use arguments::Arguments;
pub use handler::{Handler, HandlerBuilder, OperationSpec, ParamSpec};
pub use loader::{AppContext, LoadContext, ModuleContext, ModuleLoader, Registry, check_route_dir};
