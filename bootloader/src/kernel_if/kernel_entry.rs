/// Kernel Entry Handler
///
/// Builds the ePAPR register file and hands control to the loaded image.

use core::convert::Infallible;

use crate::kernel_if::uimage::ih;
use crate::utils::boot_traits::EntryTrampoline;
use crate::utils::mem_util::PhysAddr;

/// ePAPR magic passed in r6 ("EPAP")
pub const EPAPR_MAGIC: u32 = 0x4550_4150;

/// Size of the initial mapped area passed in r7
pub const BOOT_MAP_SIZE: u32 = 0x1000_0000;

/// Kernel flavour; selects how the image is described and entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFlavor {
    VxWorks,
    Linux,
    /// Raw binary entered at its first byte
    Raw,
}

impl OsFlavor {
    /// Map a uImage `ih_os` value; `None` for operating systems not booted here
    pub fn from_ih_os(os: u8) -> Option<Self> {
        match os {
            ih::OS_VXWORKS => Some(Self::VxWorks),
            ih::OS_LINUX => Some(Self::Linux),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::VxWorks => "VxWorks",
            Self::Linux => "Linux",
            Self::Raw => "raw binary",
        }
    }
}

/// Returned when the entry point hands control back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    EntryReturned,
}

impl TransferError {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferError::EntryReturned => "Kernel entry returned to the loader",
        }
    }
}

/// ePAPR argument registers r3..r9 for a client entered with `dtb`
pub fn epapr_args(dtb: PhysAddr) -> [usize; 7] {
    [
        dtb as usize,
        0,
        0,
        EPAPR_MAGIC as usize,
        BOOT_MAP_SIZE as usize,
        0,
        0,
    ]
}

/// Everything needed to enter a loaded image.
///
/// Built once per boot attempt after fixup; `transfer` consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderParam {
    pub image_base: PhysAddr,
    pub dtb_base: Option<PhysAddr>,
    pub entry: PhysAddr,
    pub flavor: OsFlavor,
}

impl LoaderParam {
    pub fn new(image_base: PhysAddr, dtb_base: Option<PhysAddr>, entry: PhysAddr, flavor: OsFlavor) -> Self {
        Self {
            image_base,
            dtb_base,
            entry,
            flavor,
        }
    }

    /// Register file handed to the entry point
    pub fn registers(&self) -> [usize; 7] {
        epapr_args(self.dtb_base.unwrap_or(0))
    }

    /// Jump to the image. Only returns if the image returned.
    pub fn transfer<T>(self, trampoline: &mut T) -> Result<Infallible, TransferError>
    where
        T: EntryTrampoline + ?Sized,
    {
        log::info!(
            "starting {} at {:#x}, dtb = {:#x}",
            self.flavor.description(),
            self.entry,
            self.dtb_base.unwrap_or(0)
        );
        trampoline.enter(self.entry, self.registers());
        log::error!("entry at {:#x} returned", self.entry);
        Err(TransferError::EntryReturned)
    }
}

type EpaprEntry = extern "C" fn(usize, usize, usize, usize, usize, usize, usize);

/// Direct branch to an identity-mapped entry point
pub struct EpaprTrampoline {
    _private: (),
}

impl EpaprTrampoline {
    /** Create the trampoline
     *
     * # Safety
     * Every address later passed to `enter` must hold executable code that
     * follows the ePAPR client calling convention.
     */
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl EntryTrampoline for EpaprTrampoline {
    fn enter(&mut self, entry: PhysAddr, args: [usize; 7]) {
        // SAFETY: covered by the contract of `EpaprTrampoline::new`.
        let func: EpaprEntry = unsafe { core::mem::transmute(entry as usize) };
        func(args[0], args[1], args[2], args[3], args[4], args[5], args[6]);
    }
}
