use state_machines::state_machine;

state_machine! {
    name: AppendMachine,
    state: AppendState,
    initial: Received,
    states: [Received, Targeted, Drafted, Stored],
    events {
        target { transition: { from: Received, to: Targeted } }
        draft { transition: { from: Received, to: Drafted } }
        merge { transition: { from: Targeted, to: Stored } }
        create { transition: { from: Drafted, to: Stored } }
    }
}

pub fn received() -> AppendMachine<(), Received> {
    AppendMachine::new(())
}
