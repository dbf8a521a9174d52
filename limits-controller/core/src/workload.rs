use crate::Quantity;

/// The parts of a workload that policy inspects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Snapshot {
    /// The containers of a pod or of a workload's pod template, in
    /// declaration order.
    Containers(Vec<Container>),

    /// A storage volume claim and the size it requests, if any.
    VolumeClaim { name: String, size: Option<Quantity> },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub requests: Resources,
    pub limits: Resources,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resources {
    pub cpu: Option<Quantity>,
    pub memory: Option<Quantity>,
}
