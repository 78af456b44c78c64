//! Main dispatch loop and host-facing API (`spec.md` §4.7, §6).
//!
//! Grounded on `original_source/src/main.c`'s `umac_init`/`umac_loop`/
//! `umac_reset`/`umac_kbd_event`/`umac_mouse`/`umac_disc_ejected`: this
//! module is the Rust equivalent of that file's entry points, restructured
//! as an owned `Emulator` value (`spec.md` §9 "Global state... Parameterise
//! as an explicit context value") instead of the C file's process-wide
//! statics. `core/src/emulator/mod.rs` (the teacher) is the architectural
//! reference for "one struct holds everything the host drives", trimmed of
//! its multi-model dispatch and cross-thread command channel, which
//! `spec.md` §5 explicitly rules out ("strictly single-threaded
//! cooperative").

use log::{error, warn};

use crate::bus::Address;
use crate::cpu::Cpu;
use crate::mac::bus::MacBus;
use crate::mac::disc::Drive;
use crate::mac::DISC_NUM_DRIVES;
use crate::tickable::Tickable;
use crate::util::clamp_ram_addr;

/// `UMAC_EXECLOOP_QUANTUM * 8` from `original_source/src/main.c`: the
/// nominal cycle budget of one `umac_loop()` iteration before VIA timer
/// deadlines cap it further.
pub const QUANTUM_CYCLES: u32 = 5000 * 8;

/// Sound buffer allocation size reserved just below the framebuffer, used
/// only to derive [`Emulator::get_audio_offset`] (`SPEC_FULL.md` §C.3).
const SOUND_BUFFER_SIZE: u32 = 0x300;

/// A running Mac Plus emulator instance: CPU, memory map, and all the
/// devices `spec.md` §2 enumerates as "the core", borrowing RAM/ROM/disc
/// buffers from the host for its lifetime (`spec.md` §3 Ownership).
pub struct Emulator<'a> {
    cpu: Cpu,
    bus: MacBus<'a>,

    ram_size: usize,
    fb_base: Address,

    disassemble: bool,
    sim_done: bool,

    global_cycles: u64,
    global_time_us: u64,

    mouse_quad: MouseQuadrature,
}

/// Simplified relative-mouse quadrature generator (`spec.md` §9 Open
/// Question: "a simplified latch rather than the two-phase X1/X2 / Y1/Y2
/// sequence a real mouse produces"). Each call to [`Emulator::mouse`] with
/// a non-zero delta toggles the corresponding phase bit, which is enough
/// for the OS's edge-triggered mouse interrupt handler to register motion.
#[derive(Debug, Default)]
struct MouseQuadrature {
    x2: bool,
    y2: bool,
}

impl<'a> Emulator<'a> {
    /// `spec.md` §6 `init(ram_base, rom_base, discs[])`: `rom` MUST already
    /// have been run through [`crate::romtool::patch`] by the host.
    /// `disp_width`/`disp_height` are needed here (not derivable from the
    /// patched ROM bytes alone) to compute the framebuffer/audio buffer
    /// offsets [`Emulator::get_fb_offset`]/[`Emulator::get_audio_offset`]
    /// report.
    pub fn init(ram: &'a mut [u8], rom: &'a [u8], disp_width: u32, disp_height: u32) -> Self {
        let ram_size = ram.len();
        let screen_size = disp_width * disp_height / 8;
        let fb_base = 0x400000u32 - screen_size - 0x380;

        let mut emu = Self {
            cpu: Cpu::new(),
            bus: MacBus::new(ram, rom),
            ram_size,
            fb_base,
            disassemble: false,
            sim_done: false,
            global_cycles: 0,
            global_time_us: 0,
            mouse_quad: MouseQuadrature::default(),
        };
        emu.cpu.reset(&mut emu.bus);
        emu
    }

    /// Mounts a disc image into `slot` (`spec.md` §3: up to
    /// `DISC_NUM_DRIVES` slots). `read_only` images reject write primes
    /// (`spec.md` §4.6).
    pub fn insert_disc(&mut self, slot: usize, image: &'a mut [u8], read_only: bool) {
        if slot >= DISC_NUM_DRIVES {
            warn!("disc slot {slot} out of range, ignoring insert");
            return;
        }
        self.bus.disc.insert(slot, Drive::new(image, read_only));
    }

    /// `spec.md` §6 `reset()`: re-pulses the CPU and sets overlay to true.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(&mut self.bus);
        self.sim_done = false;
    }

    /// `spec.md` §6 `opt_disassemble(bool)`.
    pub fn opt_disassemble(&mut self, enable: bool) {
        self.disassemble = enable;
    }

    /// `spec.md` §6 `loop() -> bool`: runs one quantum, returns `true` on
    /// fatal error (`spec.md` §4.7 steps 1-5).
    pub fn step(&mut self) -> bool {
        if self.sim_done {
            return true;
        }

        // 1. Cap the quantum to the VIA's next expected timer/shift event.
        let limit = self.bus.via.limit_cycles(u64::from(QUANTUM_CYCLES));

        self.cpu.set_irq(self.bus.irq_level());

        // 2. Run the CPU for up to that many cycles.
        let used_cycles = match self.cpu.execute(&mut self.bus, limit as u32) {
            Ok(used) => used,
            Err(e) => {
                error!("fatal CPU error: {e:#}");
                self.sim_done = true;
                return true;
            }
        };

        if self.disassemble {
            log::trace!("executed {used_cycles} cycles this quantum");
        }

        self.global_cycles += u64::from(used_cycles);
        self.global_time_us = self.global_cycles / 8;

        // 3-4. Tick the VIA (and transitively the SCC/interrupt state) by
        // the cycles actually consumed.
        if let Err(e) = self.bus.tick(u64::from(used_cycles)) {
            error!("fatal error ticking devices: {e:#}");
            self.sim_done = true;
            return true;
        }

        // 5. Keyboard service deferred-work check: resolves a pending
        // command into a response only once at least one full quantum has
        // elapsed since its transmit completed (`spec.md` §4.5's
        // intentional one-quantum delay), matching
        // `original_source/src/main.c`'s `kbd_check_work`.
        self.check_deferred_keyboard_work();

        if let Err(e) = crate::mac::bus::check_fault(&self.bus) {
            error!("{e:#}");
            self.sim_done = true;
            return true;
        }

        false
    }

    fn check_deferred_keyboard_work(&mut self) {
        self.bus.via.service_keyboard(u64::from(QUANTUM_CYCLES));
    }

    /// `spec.md` §6 `kbd_event(scancode, down)`: the scancode's high bit
    /// carries the down/up state per the M0110 protocol (`spec.md` §4.5).
    pub fn kbd_event(&mut self, scancode: u8, down: bool) {
        let transition = if down { scancode & 0x7F } else { scancode | 0x80 };
        self.bus.via.keyboard.push_event(transition);
    }

    /// `spec.md` §6 `mouse(dx, dy, button)`: relative motion through the
    /// VIA's quadrature-style inputs.
    pub fn mouse(&mut self, dx: i32, dy: i32, button: bool) {
        if dx != 0 {
            self.mouse_quad.x2 = !self.mouse_quad.x2;
        }
        if dy != 0 {
            self.mouse_quad.y2 = !self.mouse_quad.y2;
        }
        self.bus.mouse_update_rel(self.mouse_quad.x2, self.mouse_quad.y2, button);
        self.sync_irq();
    }

    /// `spec.md` §6 `absmouse(x, y, button)`: writes the low-memory mouse
    /// temp variables directly, bypassing the quadrature path.
    pub fn absmouse(&mut self, x: u16, y: u16, button: bool) {
        self.bus.mouse_update_abs(x, y);
        self.bus.via.set_mouse(self.mouse_quad.x2, self.mouse_quad.y2, button);
        self.sync_irq();
    }

    /// `spec.md` §6 `vsync_event()`: asserts VIA CA1, once per 1/60s frame.
    pub fn vsync_event(&mut self) {
        self.bus.via.assert_ca1();
        self.sync_irq();
    }

    /// `spec.md` §6 `1hz_event()`: asserts VIA CA2, once per second.
    pub fn one_hz_event(&mut self) {
        self.bus.via.assert_ca2();
        self.sync_irq();
    }

    fn sync_irq(&mut self) {
        self.bus.sync_irq();
    }

    /// `spec.md` §6 `get_fb_offset()`: current framebuffer offset into the
    /// RAM buffer, "taking overlay into account" (`spec.md` §6). The
    /// screen base address is always expressed relative to the top of the
    /// 0x400000 address space; clamping it into the RAM buffer with
    /// [`clamp_ram_addr`] is what makes the same formula valid whether the
    /// host is currently looking at RAM through the low overlay window or
    /// the high 0x600000 mirror.
    pub fn get_fb_offset(&self) -> usize {
        clamp_ram_addr(self.fb_base, self.ram_size)
    }

    /// `spec.md` §6 `get_audio_offset()`: current sound buffer offset,
    /// reserved just below the framebuffer (`SPEC_FULL.md` §C.3).
    pub fn get_audio_offset(&self) -> usize {
        clamp_ram_addr(self.fb_base.wrapping_sub(SOUND_BUFFER_SIZE), self.ram_size)
    }

    /// Drains disc slots reported ejected since the last call
    /// (`spec.md` §6 "Core -> host").
    pub fn take_ejected_discs(&mut self) -> Vec<usize> {
        self.bus.take_ejected()
    }

    pub fn overlay(&self) -> bool {
        self.bus.overlay()
    }

    /// Microseconds of virtual time elapsed, for host frame pacing.
    pub fn elapsed_micros(&self) -> u64 {
        self.global_time_us
    }

    /// Direct RAM access for the host's framebuffer/audio readers.
    pub fn ram(&self) -> &[u8] {
        self.bus.ram_slice()
    }
}
