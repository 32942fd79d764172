// RAWLINK — ENGINE MODULE
// The busy-polling side of the endpoint: the cycle timebase and the two
// protocol pollers. One tick is an RX pass followed by a TX pass; nothing
// in here yields to a scheduler or blocks on a kernel primitive.

pub mod clock;
pub mod sig;
pub mod urp;

/// Pin the calling thread to one CPU. Engine workers and the demo app
/// threads each get their own core.
pub fn pin_to_core(core_id: usize) -> std::io::Result<()> {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}
