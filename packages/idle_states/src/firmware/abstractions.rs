use std::fmt::Debug;

/// Source of platform capability data.
///
/// Firmware describes the platform as a tree of nodes addressed by path, each node carrying
/// named properties with raw byte values. Alongside it, the operating system publishes a few
/// plain-text views of processor topology. This trait abstracts both so they can be faked or
/// mocked.
///
/// Absence of any item is a valid answer, never an error. Callers decide what a missing item
/// means. All access is synchronous; the data is expected to be in memory already.
#[cfg_attr(test, mockall::automock)]
pub trait Firmware: Debug + Send + Sync + 'static {
    /// Whether the node at `node_path` exists (e.g. `/ibm,opal/power-mgt`).
    fn has_node(&self, node_path: &str) -> bool;

    /// The raw value of `property` on the node at `node_path`, or `None` if either the node or
    /// the property does not exist.
    fn get_property(&self, node_path: &str, property: &str) -> Option<Vec<u8>>;

    /// The list of processors that are present on the platform, in cpulist format
    /// ("0-3,8-11" style list).
    ///
    /// Present processors have backing hardware the operating system can use. This may be a
    /// strict subset of the possible processors.
    fn get_present_cpulist(&self) -> Option<String>;

    /// The list of processors that could possibly exist on the platform, in cpulist format.
    fn get_possible_cpulist(&self) -> Option<String>;

    /// Plain-text processor information with "key : value" lines, used to find the
    /// frequency of the time base.
    fn get_cpuinfo_contents(&self) -> Option<String>;
}
