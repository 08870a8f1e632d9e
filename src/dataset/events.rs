/// Structural change of a dataset, delivered to listeners registered with
/// [`Dataset::on_changed`](crate::dataset::Dataset::on_changed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetEvent {
    DatasetRenamed { from: String, to: String },
    SessionAdded { session: String },
    SessionRemoved { session: String },
    SessionRenamed { from: String, to: String },
    /// Sessions moved in from another dataset.
    SessionsAppended { sessions: Vec<String> },
    PartitionAdded { session: String, partition: String },
    /// A derived partition overwrote an existing one of the same name.
    PartitionReplaced { session: String, partition: String },
    PartitionRemoved { session: String, partition: String },
    PartitionRenamed { session: String, from: String, to: String },
}

pub type ChangeListener = Box<dyn FnMut(&DatasetEvent) + Send>;
