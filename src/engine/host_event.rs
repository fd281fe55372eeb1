/// Lifecycle notifications as the host's generic callback reports them.
///
/// Hosts that do not call the dedicated entry points forward a numeric id instead. Only the
/// activity and surface events drive the session; the rest are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEvent {
    /// Application entered background
    EnteredBackground,
    /// Application will enter foreground
    WillEnterForeground,
    /// Activity paused (Android `onPause`)
    Paused,
    /// Activity resumed (Android `onResume`)
    Resumed,
    /// Activity destroyed (Android `onDestroy`)
    Destroyed,
    /// Window will close
    WindowWillClose,
    /// Window minimized
    WindowMinimized,
    /// Window restored from minimized state
    WindowRestored,
    /// Memory warning
    MemoryWarning,
    /// Surface destroyed by the host
    SurfaceLost,
    /// Surface recreated by the host. Carries no handle; use `surface_created` for that.
    SurfaceRecreated,
    /// Window moved
    WindowMoved,
    /// Window resized. Carries no geometry; use `surface_changed` for that.
    WindowResized,
}

impl HostEvent {
    /// Maps a host event id to a [`HostEvent`]. Unknown ids yield `None`.
    pub fn from_id(id: u32) -> Option<Self> {
        let event = match id {
            0 => HostEvent::EnteredBackground,
            1 => HostEvent::WillEnterForeground,
            2 => HostEvent::Paused,
            3 => HostEvent::Resumed,
            4 => HostEvent::Destroyed,
            5 => HostEvent::WindowWillClose,
            6 => HostEvent::WindowMinimized,
            7 => HostEvent::WindowRestored,
            8 => HostEvent::MemoryWarning,
            9 => HostEvent::SurfaceLost,
            10 => HostEvent::SurfaceRecreated,
            11 => HostEvent::WindowMoved,
            12 => HostEvent::WindowResized,
            _ => return None,
        };
        Some(event)
    }
}
