pub mod config;
pub mod legacy;
pub mod run;
pub mod test_item;

pub use config::{Config, LoggingConfig};
pub use legacy::{
    DiscoveryEvent, DiscoveryFinished, DiscoveryOutcome, NodeRef, RetireEvent, SuiteState,
    TestDecoration, TestDescriptor, TestEvent, TestInfo, TestRunEvent, TestRunFinished,
    TestRunStarted, TestState, TestSuiteEvent, TestSuiteInfo,
};
pub use run::{
    Location, MessageKind, RunOutcome, RunProfile, RunRequest, RunRequestContext, RunToken,
    TestMessage,
};
pub use test_item::{
    ConverterId, ItemDraft, ItemId, ItemKind, ItemSnapshot, ItemTree, SharedItemTree, TestItem,
};
