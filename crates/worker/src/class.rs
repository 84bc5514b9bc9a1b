/// Dedicated threads of a running application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadRole {
	/// The event handler thread, holder of the graph's UI role.
	Ui,
	/// The render thread, reading the graph while frozen.
	Render,
	/// The timer pool thread.
	Timer,
}

impl ThreadRole {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ui => "ui",
			Self::Render => "render",
			Self::Timer => "timer",
		}
	}

	/// OS thread name used when spawning this role.
	pub const fn thread_name(self) -> &'static str {
		match self {
			Self::Ui => "arbor-ui",
			Self::Render => "arbor-render",
			Self::Timer => "arbor-timer",
		}
	}
}
