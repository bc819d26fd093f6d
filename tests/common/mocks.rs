//! Mock version of the abort collaborator
use mockall::mock;

use xml_record_stream::core::abort::AbortHook;

mock! {
    pub Abort {}
    impl AbortHook for Abort {
        fn shutdown(&self);
    }
}
