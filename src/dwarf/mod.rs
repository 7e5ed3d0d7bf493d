mod provider;

pub(crate) use provider::DwarfProvider;
