use std::borrow::Cow;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::rc::Rc;

use gimli::AttributeValue;
use gimli::EndianRcSlice;
use gimli::Reader as _;
use gimli::RunTimeEndian;
use gimli::UnitOffset;
use gimli::UnitRef;

use crate::log::debug;
use crate::object::ObjectReader;
use crate::symbolize::DebugInfoProvider;
use crate::symbolize::FunctionNameKind;
use crate::symbolize::LineInfo;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


/// The reader type used for all DWARF sections.
///
/// Section data is copied into reference counted buffers, so that the
/// provider does not borrow from the object it was created from.
type Reader = EndianRcSlice<RunTimeEndian>;

type Frame<'ctx> = addr2line::Frame<'ctx, Reader>;

/// The maximum number of `DW_AT_abstract_origin` and
/// `DW_AT_specification` links followed when looking for a name.
const MAX_NAME_LINKS: usize = 16;


/// Find the `DW_AT_name` of the DIE at `offset`, following links to
/// the abstract instance or the declaration if necessary.
fn short_name(unit: UnitRef<'_, Reader>, mut offset: UnitOffset) -> Result<Option<String>> {
    for _ in 0..MAX_NAME_LINKS {
        let entry = unit.entry(offset)?;
        if let Some(value) = entry.attr_value(gimli::DW_AT_name)? {
            let name = unit.attr_string(value)?;
            let name = name.to_string_lossy()?.into_owned();
            return Ok(Some(name))
        }

        let link = match entry.attr_value(gimli::DW_AT_abstract_origin)? {
            Some(link) => Some(link),
            None => entry.attr_value(gimli::DW_AT_specification)?,
        };
        match link {
            Some(AttributeValue::UnitRef(link)) => offset = link,
            // References into other units are not followed.
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// The name addr2line reports, which prefers `DW_AT_linkage_name`.
fn linkage_name(frame: &Frame<'_>) -> Result<Option<String>> {
    let name = frame
        .function
        .as_ref()
        .map(|function| function.raw_name().map(Cow::into_owned))
        .transpose()?;
    Ok(name)
}

fn line_info(
    frame: Frame<'_>,
    unit: Option<UnitRef<'_, Reader>>,
    names: FunctionNameKind,
) -> Result<LineInfo> {
    let function_name = match names {
        FunctionNameKind::None => None,
        FunctionNameKind::Short => {
            let name = match (unit, frame.dw_die_offset) {
                (Some(unit), Some(offset)) => short_name(unit, offset)?,
                _ => None,
            };
            match name {
                Some(name) => Some(name),
                None => linkage_name(&frame)?,
            }
        }
        FunctionNameKind::Linkage => linkage_name(&frame)?,
    };

    let mut info = LineInfo {
        function_name,
        ..Default::default()
    };
    if let Some(location) = frame.location {
        info.file_name = location.file.map(str::to_string);
        info.line = location.line.unwrap_or(0);
        info.column = location.column.unwrap_or(0);
    }
    Ok(info)
}


/// A debug info provider backed by DWARF data.
pub(crate) struct DwarfProvider {
    context: addr2line::Context<Reader>,
}

impl DwarfProvider {
    /// Create a provider for the DWARF sections of `obj`.
    ///
    /// Missing sections are treated as empty, so an object without any
    /// debug information results in a provider that knows nothing.
    pub(crate) fn new(obj: &dyn ObjectReader) -> Result<Self> {
        let endian = if obj.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let dwarf = gimli::Dwarf::load(|section| -> Result<Reader, Error> {
            let data = obj
                .section_data(section.name())
                .with_context(|| format!("failed to load DWARF section `{}`", section.name()))?;
            let data = data.as_deref().unwrap_or(&[]);
            Ok(EndianRcSlice::new(Rc::from(data), endian))
        })?;

        let context =
            addr2line::Context::from_dwarf(dwarf).context("failed to create DWARF context")?;
        debug!("loaded DWARF debug information");
        Ok(Self { context })
    }
}

impl DwarfProvider {
    /// Retrieve the unit covering `addr`, if short names are requested
    /// and hence DIEs have to be inspected.
    fn unit(&self, addr: Addr, names: FunctionNameKind) -> Option<UnitRef<'_, Reader>> {
        if names == FunctionNameKind::Short {
            self.context.find_dwarf_and_unit(addr).skip_all_loads()
        } else {
            None
        }
    }
}

impl DebugInfoProvider for DwarfProvider {
    fn find_line(&self, addr: Addr, names: FunctionNameKind) -> Result<LineInfo> {
        let mut frames = self.context.find_frames(addr).skip_all_loads()?;
        if let Some(frame) = frames.next()? {
            return line_info(frame, self.unit(addr, names), names)
        }

        let location = self.context.find_location(addr)?;
        let info = location
            .map(|location| LineInfo {
                function_name: None,
                file_name: location.file.map(str::to_string),
                line: location.line.unwrap_or(0),
                column: location.column.unwrap_or(0),
            })
            .unwrap_or_default();
        Ok(info)
    }

    fn find_frames(&self, addr: Addr, names: FunctionNameKind) -> Result<Vec<LineInfo>> {
        let unit = self.unit(addr, names);
        let mut frames = self.context.find_frames(addr).skip_all_loads()?;
        let mut infos = Vec::new();
        while let Some(frame) = frames.next()? {
            let () = infos.push(line_info(frame, unit, names)?);
        }
        Ok(infos)
    }
}

impl Debug for DwarfProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DwarfProvider").finish_non_exhaustive()
    }
}
